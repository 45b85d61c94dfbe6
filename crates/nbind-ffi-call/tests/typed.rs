use std::ffi::c_void;

use nbind_ffi_call::typing::SemanticType;
use nbind_ffi_call::{CallFailure, Engine, SymbolTable, native_contract};

nbind_ffi_call::typing::native_struct! {
    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    pub struct Point {
        pub x: i32,
        pub y: i32,
    }
}

nbind_ffi_call::typing::native_struct! {
    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    pub struct Rect {
        pub origin: Point,
        pub extent: Point,
    }
}

static UNIT: Rect = Rect {
    origin: Point { x: 0, y: 0 },
    extent: Point { x: 1, y: 1 },
};

extern "C" fn get_cursor_pos(point: *mut Point) -> i32 {
    unsafe {
        (*point).x = 100;
        (*point).y = 200;
    }
    1
}

extern "C" fn area(rect: *const Rect) -> i64 {
    let rect = unsafe { &*rect };
    i64::from(rect.extent.x - rect.origin.x) * i64::from(rect.extent.y - rect.origin.y)
}

extern "C" fn grow(rect: *mut Rect, by: i32) {
    unsafe {
        (*rect).extent.x += by;
        (*rect).extent.y += by;
    }
}

extern "C" fn unit_rect() -> *const Rect {
    &UNIT
}

extern "C" fn beep() {}

native_contract! {
    /// Cursor and rectangle helpers.
    pub contract Shapes {
        fn GetCursorPos(point: &mut Point) -> i32;
        fn Area(rect: &Rect) -> i64;
        fn Grow(rect: &mut Rect, by: i32) -> ();
        fn UnitRect() -> Rect;
        fn Beep() -> ();
    }
}

fn stubs() -> SymbolTable {
    SymbolTable::new("shapes")
        .with("GetCursorPos", get_cursor_pos as *const c_void)
        .with("Area", area as *const c_void)
        .with("Grow", grow as *const c_void)
        .with("UnitRect", unit_rect as *const c_void)
        .with("Beep", beep as *const c_void)
}

#[test]
fn typed_contract_declaration() {
    let contract = Shapes::contract();
    assert_eq!(contract.name(), "Shapes");
    let grow = contract.find("Grow").unwrap();
    assert_eq!(
        grow.params,
        vec![SemanticType::structure("Rect"), SemanticType::Int]
    );
    assert_eq!(grow.ret, SemanticType::Void);
    assert_eq!(contract.find("UnitRect").unwrap().ret, SemanticType::structure("Rect"));
}

#[test]
fn typed_calls_round_trip_structs() {
    let engine = Engine::default();
    let shapes = Shapes::bind(&engine, &stubs()).unwrap();
    assert!(engine.types().is_registered("Point"));

    let mut cursor = Point::default();
    assert_eq!(shapes.GetCursorPos(&mut cursor).unwrap(), 1);
    assert_eq!(cursor, Point { x: 100, y: 200 });

    let mut rect = Rect {
        origin: Point { x: 1, y: 1 },
        extent: Point { x: 4, y: 3 },
    };
    assert_eq!(shapes.Area(&rect).unwrap(), 6);
    shapes.Grow(&mut rect, 2).unwrap();
    assert_eq!(rect.extent, Point { x: 6, y: 5 });
    assert_eq!(shapes.Area(&rect).unwrap(), 20);

    assert_eq!(shapes.UnitRect().unwrap(), UNIT);
    shapes.Beep().unwrap();
}

#[test]
fn typed_bind_reports_missing_symbols() {
    let table = SymbolTable::new("partial").with("Beep", beep as *const c_void);
    let err = Shapes::bind(&Engine::default(), &table).unwrap_err();
    assert!(err.to_string().contains("not found in `partial`"));
}

#[test]
fn typed_facade_shares_the_bound_contract() {
    let engine = Engine::default();
    let first = Shapes::bind(&engine, &stubs()).unwrap();
    let second = Shapes::bind(&engine, &stubs()).unwrap();
    assert!(std::ptr::eq(first.bound(), second.bound()));

    let err = first.bound().invoke("Area", &mut []).unwrap_err();
    assert!(matches!(err.cause, CallFailure::Arity { expected: 1, found: 0 }));
}
