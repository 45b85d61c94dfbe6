use std::ffi::c_void;
use std::sync::Arc;
use std::thread;

use nbind_ffi_call::typing::{
    Contract, NativeLayout, NativeStruct, SemanticType, SignatureFile, StructType, StructValue,
    Value,
};
use nbind_ffi_call::{BindError, CallFailure, Engine, EngineConfig, SymbolTable};
use proptest::prelude::*;

nbind_ffi_call::typing::native_struct! {
    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    pub struct Point {
        pub x: i32,
        pub y: i32,
    }
}

// ---------------------------------------------------------------------------
// native stubs
// ---------------------------------------------------------------------------

static ORIGIN: Point = Point { x: 7, y: -7 };

extern "C" fn get_cursor_pos(point: *mut Point) -> i32 {
    unsafe {
        (*point).x = 100;
        (*point).y = 200;
    }
    1
}

extern "C" fn add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

extern "C" fn sub(a: i32, b: i32) -> i32 {
    a.wrapping_sub(b)
}

extern "C" fn translate(point: *mut Point, dx: i32, dy: i32) {
    unsafe {
        (*point).x += dx;
        (*point).y += dy;
    }
}

extern "C" fn origin() -> *const Point {
    &ORIGIN
}

extern "C" fn nowhere() -> *const Point {
    std::ptr::null()
}

extern "C" fn is_positive(x: i32) -> bool {
    x > 0
}

extern "C" fn half(x: f64) -> f64 {
    x / 2.0
}

extern "C" fn sum6(a: i64, b: i64, c: i64, d: i64, e: i64, f: i64) -> i64 {
    a + b + c + d + e + f
}

fn stubs(id: &str) -> SymbolTable {
    SymbolTable::new(id)
        .with("GetCursorPos", get_cursor_pos as *const c_void)
        .with("Add", add as *const c_void)
        .with("Translate", translate as *const c_void)
        .with("Origin", origin as *const c_void)
        .with("Nowhere", nowhere as *const c_void)
        .with("IsPositive", is_positive as *const c_void)
        .with("Half", half as *const c_void)
        .with("Sum6", sum6 as *const c_void)
}

fn point() -> SemanticType {
    SemanticType::structure("Point")
}

fn engine() -> Engine {
    let engine = Engine::new(EngineConfig::default());
    engine.declare::<Point>().unwrap();
    engine
}

fn user32() -> Contract {
    Contract::new("User32")
        .method("GetCursorPos", vec![point()], SemanticType::Int)
        .method("Add", vec![SemanticType::Int, SemanticType::Int], SemanticType::Int)
}

fn point_value(x: i32, y: i32) -> Value {
    Value::Struct(Point { x, y }.to_struct_value())
}

fn read_point(value: &Value) -> Point {
    Point::from_struct_value(value.as_struct().unwrap()).unwrap()
}

// ---------------------------------------------------------------------------
// binding
// ---------------------------------------------------------------------------

#[test]
fn binding_twice_returns_the_same_instance() {
    let engine = engine();
    let table = stubs("stubs");
    let first = engine.bind(&user32(), &table).unwrap();
    let second = engine.bind(&user32(), &table).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let other = engine.bind(&user32(), &stubs("other")).unwrap();
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(engine.cache_stats().contracts, 2);
    assert_eq!(first.to_string(), "User32 @ stubs (2 methods)");
    assert_eq!(first.methods().collect::<Vec<_>>(), vec!["GetCursorPos", "Add"]);
}

#[test]
fn empty_contract_is_rejected() {
    let err = engine().bind(&Contract::new("Nothing"), &stubs("stubs")).unwrap_err();
    assert!(matches!(err, BindError::EmptyContract { ref contract } if contract == "Nothing"));
}

#[test]
fn missing_symbol_fails_at_bind_time() {
    let engine = engine();
    let contract = user32().method("Missing", vec![], SemanticType::Void);
    let err = engine.bind(&contract, &stubs("stubs")).unwrap_err();
    match err {
        BindError::SymbolNotFound {
            contract,
            symbol,
            source_id,
        } => {
            assert_eq!(contract, "User32");
            assert_eq!(symbol, "Missing");
            assert_eq!(source_id, "stubs");
        }
        other => panic!("unexpected error: {other}"),
    }
    let stats = engine.cache_stats();
    assert_eq!(stats.contracts, 0);
    assert_eq!(stats.methods, 0);
}

#[test]
fn changed_declaration_binds_a_new_contract() {
    let engine = engine();
    let table = stubs("stubs");
    let add = Contract::new("Calc").method("Add", vec![SemanticType::Int; 2], SemanticType::Int);
    let first = engine.bind(&add, &table).unwrap();

    let wider = add
        .clone()
        .method("Half", vec![SemanticType::Double], SemanticType::Double);
    let second = engine.bind(&wider, &table).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.methods().collect::<Vec<_>>(), vec!["Add", "Half"]);
    assert_eq!(
        second.invoke("Half", &mut [Value::Double(3.0)]).unwrap(),
        Value::Double(1.5)
    );

    let stats = engine.cache_stats();
    assert_eq!(stats.contracts, 2);
    assert_eq!(stats.methods, 2);
    assert!(Arc::ptr_eq(&first, &engine.bind(&add, &table).unwrap()));
}

#[test]
fn failed_bind_leaves_no_stale_method() {
    let engine = engine();
    let table = stubs("stubs");
    let broken = Contract::new("Halves")
        .method("Half", vec![SemanticType::Int], SemanticType::Int)
        .method("Missing", vec![], SemanticType::Void);
    assert!(engine.bind(&broken, &table).is_err());
    assert_eq!(engine.cache_stats().methods, 0);

    let fixed = Contract::new("Halves").method(
        "Half",
        vec![SemanticType::Double],
        SemanticType::Double,
    );
    let bound = engine.bind(&fixed, &table).unwrap();
    let signature = bound.method("Half").unwrap().signature();
    assert_eq!(signature.params, vec![NativeLayout::Double]);
    assert_eq!(signature.ret, Some(NativeLayout::Double));
    assert_eq!(
        bound.invoke("Half", &mut [Value::Double(9.0)]).unwrap(),
        Value::Double(4.5)
    );
}

#[test]
fn sources_sharing_an_id_keep_their_own_entry_points() {
    let engine = engine();
    let contract =
        Contract::new("Calc").method("Add", vec![SemanticType::Int; 2], SemanticType::Int);
    let adding = engine.bind(&contract, &stubs("math")).unwrap();
    let subtracting = SymbolTable::new("math").with("Add", sub as *const c_void);
    let swapped = engine.bind(&contract, &subtracting).unwrap();

    assert!(!Arc::ptr_eq(&adding, &swapped));
    assert_eq!(swapped.source_id(), "math");
    assert_eq!(
        adding.invoke("Add", &mut [Value::Int(5), Value::Int(3)]).unwrap(),
        Value::Int(8)
    );
    assert_eq!(
        swapped.invoke("Add", &mut [Value::Int(5), Value::Int(3)]).unwrap(),
        Value::Int(2)
    );
    assert!(Arc::ptr_eq(&adding, &engine.bind(&contract, &stubs("math")).unwrap()));
}

#[test]
fn unregistered_struct_is_unsupported() {
    let engine = Engine::default();
    let err = engine.bind(&user32(), &stubs("stubs")).unwrap_err();
    assert!(matches!(
        err,
        BindError::UnsupportedType { ref method, .. } if method == "GetCursorPos"
    ));
}

#[test]
fn immutable_struct_cannot_be_a_parameter() {
    let engine = Engine::default();
    engine
        .register_struct(
            StructType::new("Point")
                .field("x", SemanticType::Int)
                .field("y", SemanticType::Int)
                .immutable(),
        )
        .unwrap();
    let err = engine.bind(&user32(), &stubs("stubs")).unwrap_err();
    assert!(err.to_string().contains("immutable"));
}

#[test]
fn duplicate_methods_are_rejected() {
    let contract = user32().method("Add", vec![SemanticType::Int; 2], SemanticType::Int);
    let err = engine().bind(&contract, &stubs("stubs")).unwrap_err();
    assert!(matches!(err, BindError::DuplicateMethod { ref method, .. } if method == "Add"));
}

// ---------------------------------------------------------------------------
// invocation
// ---------------------------------------------------------------------------

#[test]
fn struct_argument_is_written_back() {
    let bound = engine().bind(&user32(), &stubs("stubs")).unwrap();
    let mut args = vec![point_value(0, 0)];
    let result = bound.invoke("GetCursorPos", &mut args).unwrap();
    assert_eq!(result, Value::Int(1));
    assert_eq!(read_point(&args[0]), Point { x: 100, y: 200 });
}

#[test]
fn primitive_calls_use_the_cached_path() {
    let engine = engine();
    let bound = engine.bind(&user32(), &stubs("stubs")).unwrap();
    assert_eq!(
        bound.invoke("Add", &mut [Value::Int(2), Value::Int(3)]).unwrap(),
        Value::Int(5)
    );
    assert_eq!(
        bound.invoke("Add", &mut [Value::Int(-1), Value::Int(1)]).unwrap(),
        Value::Int(0)
    );
    let stats = engine.cache_stats();
    assert_eq!(stats.methods, 2);
    assert_eq!(stats.paths, 1);
    assert!(bound.method("Add").unwrap().is_direct());
    assert!(!bound.method("GetCursorPos").unwrap().is_direct());
}

#[test]
fn mixed_struct_and_primitive_arguments() {
    let contract = Contract::new("Geometry").method(
        "Translate",
        vec![point(), SemanticType::Int, SemanticType::Int],
        SemanticType::Void,
    );
    let bound = engine().bind(&contract, &stubs("stubs")).unwrap();
    let mut args = vec![point_value(1, 2), Value::Int(10), Value::Int(-20)];
    assert_eq!(bound.invoke("Translate", &mut args).unwrap(), Value::Void);
    assert_eq!(read_point(&args[0]), Point { x: 11, y: -18 });
    assert_eq!(args[1], Value::Int(10));
}

#[test]
fn struct_return_is_materialized() {
    let contract = Contract::new("Geometry")
        .method("Origin", vec![], point())
        .method("Nowhere", vec![], point());
    let bound = engine().bind(&contract, &stubs("stubs")).unwrap();

    let origin = bound.invoke("Origin", &mut []).unwrap();
    assert_eq!(read_point(&origin), ORIGIN);

    let err = bound.invoke("Nowhere", &mut []).unwrap_err();
    assert_eq!(err.method, "Nowhere");
    assert!(matches!(
        err.cause,
        CallFailure::NullStructReturn { ref structure } if structure == "Point"
    ));
}

#[test]
fn other_primitive_kinds() {
    let contract = Contract::new("Misc")
        .method("IsPositive", vec![SemanticType::Int], SemanticType::Bool)
        .method("Half", vec![SemanticType::Double], SemanticType::Double);
    let bound = engine().bind(&contract, &stubs("stubs")).unwrap();
    assert_eq!(
        bound.invoke("IsPositive", &mut [Value::Int(3)]).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        bound.invoke("IsPositive", &mut [Value::Int(-3)]).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(
        bound.invoke("Half", &mut [Value::Double(5.0)]).unwrap(),
        Value::Double(2.5)
    );
}

#[test]
fn arity_beyond_the_fast_path_still_dispatches() {
    let engine = Engine::new(EngineConfig::default().with_fast_path_max_arity(2));
    let contract =
        Contract::new("Wide").method("Sum6", vec![SemanticType::Long; 6], SemanticType::Long);
    let bound = engine.bind(&contract, &stubs("stubs")).unwrap();
    let mut args: Vec<Value> = (1..=6).map(Value::Long).collect();
    assert_eq!(bound.invoke("Sum6", &mut args).unwrap(), Value::Long(21));
}

#[test]
fn traced_calls_behave_the_same() {
    let engine = Engine::new(EngineConfig::default().with_trace_calls(true));
    engine.declare::<Point>().unwrap();
    let bound = engine.bind(&user32(), &stubs("stubs")).unwrap();
    assert_eq!(
        bound.invoke("Add", &mut [Value::Int(20), Value::Int(22)]).unwrap(),
        Value::Int(42)
    );
}

#[test]
fn invocation_errors() {
    let bound = engine().bind(&user32(), &stubs("stubs")).unwrap();

    let err = bound.invoke("Nope", &mut []).unwrap_err();
    assert!(matches!(err.cause, CallFailure::UnknownMethod(ref name) if name == "Nope"));

    let err = bound.invoke("Add", &mut [Value::Int(1)]).unwrap_err();
    assert!(matches!(err.cause, CallFailure::Arity { expected: 2, found: 1 }));

    let err = bound
        .invoke("Add", &mut [Value::Int(1), Value::Long(1)])
        .unwrap_err();
    assert!(matches!(err.cause, CallFailure::ArgumentType { index: 1, .. }));

    let err = bound.invoke("GetCursorPos", &mut [Value::Int(0)]).unwrap_err();
    assert!(matches!(
        err.cause,
        CallFailure::ArgumentType { index: 0, ref expected, ref found }
            if expected == "Point" && found == "int"
    ));

    let wrong = Value::Struct(StructValue::new("Point", vec![("x".into(), Value::Int(0))]));
    let err = bound.invoke("GetCursorPos", &mut [wrong]).unwrap_err();
    assert!(matches!(err.cause, CallFailure::Marshal(_)));
    assert!(err.to_string().starts_with("invocation of `GetCursorPos` failed"));
}

proptest! {
    #[test]
    fn direct_calls_match_host_arithmetic(
        a in any::<i32>(),
        b in any::<i32>(),
        x in -1.0e12f64..1.0e12,
    ) {
        let contract = user32()
            .method("Half", vec![SemanticType::Double], SemanticType::Double);
        let bound = engine().bind(&contract, &stubs("stubs")).unwrap();
        prop_assert_eq!(
            bound.invoke("Add", &mut [Value::Int(a), Value::Int(b)]).unwrap(),
            Value::Int(a.wrapping_add(b))
        );
        prop_assert_eq!(
            bound.invoke("Half", &mut [Value::Double(x)]).unwrap(),
            Value::Double(x / 2.0)
        );
    }
}

// ---------------------------------------------------------------------------
// concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_invocations_are_independent() {
    const THREADS: i32 = 8;
    const CALLS: i32 = 500;

    let bound = engine().bind(&user32(), &stubs("stubs")).unwrap();
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let bound = bound.clone();
            thread::spawn(move || {
                for i in 0..CALLS {
                    let sum = bound
                        .invoke("Add", &mut [Value::Int(t), Value::Int(i)])
                        .unwrap();
                    assert_eq!(sum, Value::Int(t + i));

                    let mut args = vec![point_value(t, i)];
                    bound.invoke("GetCursorPos", &mut args).unwrap();
                    assert_eq!(read_point(&args[0]), Point { x: 100, y: 200 });
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn concurrent_binds_share_one_instance() {
    let engine = engine();
    let table = Arc::new(stubs("stubs"));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            let table = table.clone();
            thread::spawn(move || engine.bind(&user32(), &*table).unwrap())
        })
        .collect();
    let bound: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(bound.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(engine.cache_stats().contracts, 1);
}

// ---------------------------------------------------------------------------
// signature files and shared libraries
// ---------------------------------------------------------------------------

#[test]
fn signature_file_binds_and_calls() {
    let file = SignatureFile::parse(
        "user32",
        r#"
# cursor helpers
struct Point { x: int, y: int }

GetCursorPos: (point: Point) -> int
Add: (int, int) -> int
"#,
    )
    .unwrap();
    let engine = Engine::default();
    let bound = engine.bind_file(&file, &stubs("stubs")).unwrap();
    let mut args = vec![point_value(0, 0)];
    assert_eq!(bound.invoke("GetCursorPos", &mut args).unwrap(), Value::Int(1));
    assert_eq!(read_point(&args[0]), Point { x: 100, y: 200 });
}

#[cfg(target_os = "linux")]
#[test]
fn libm_cos() {
    let Ok(libm) = nbind_ffi_call::Library::load("libm.so.6") else {
        eprintln!("libm.so.6 not available, skipping");
        return;
    };
    let contract =
        Contract::new("libm").method("cos", vec![SemanticType::Double], SemanticType::Double);
    let bound = Engine::default().bind(&contract, &libm).unwrap();
    assert_eq!(bound.invoke("cos", &mut [Value::Double(0.0)]).unwrap(), Value::Double(1.0));
}
