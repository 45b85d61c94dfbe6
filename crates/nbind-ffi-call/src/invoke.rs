//! libffi call interfaces and the arity-specialized call paths built on them.

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use libffi::middle::{Arg, Cif, CodePtr, Type};
use nbind_typing::{NativeLayout, Value};

use crate::CallFailure;
use crate::config::MAX_SPECIALIZED_ARITY;

/// Native-level signature of a bound method. Struct parameters and returns
/// appear as addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSignature {
    pub params: Vec<NativeLayout>,
    /// `None` for `void`.
    pub ret: Option<NativeLayout>,
}

impl CallSignature {
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// One encoded argument. libffi reads each argument through a pointer, so
/// the slots must stay put until the call returns.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ArgSlot {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bool(u8),
    WChar(u16),
    Address(usize),
}

impl ArgSlot {
    const EMPTY: ArgSlot = ArgSlot::Long(0);

    pub(crate) fn encode(
        index: usize,
        layout: &NativeLayout,
        value: &Value,
    ) -> Result<Self, CallFailure> {
        let slot = match (layout, value) {
            (NativeLayout::Byte, Value::Byte(v)) => ArgSlot::Byte(*v),
            (NativeLayout::Short, Value::Short(v)) => ArgSlot::Short(*v),
            (NativeLayout::Int, Value::Int(v)) => ArgSlot::Int(*v),
            (NativeLayout::Long, Value::Long(v)) => ArgSlot::Long(*v),
            (NativeLayout::Float, Value::Float(v)) => ArgSlot::Float(*v),
            (NativeLayout::Double, Value::Double(v)) => ArgSlot::Double(*v),
            (NativeLayout::Bool, Value::Bool(v)) => ArgSlot::Bool(u8::from(*v)),
            (NativeLayout::WChar, Value::WChar(v)) => ArgSlot::WChar(*v),
            (NativeLayout::Address, Value::Address(v)) => ArgSlot::Address(*v),
            (layout, value) => {
                return Err(CallFailure::ArgumentType {
                    index,
                    expected: layout.name().to_string(),
                    found: value.kind().to_string(),
                });
            }
        };
        Ok(slot)
    }

    pub(crate) fn arg(&self) -> Arg {
        match self {
            ArgSlot::Byte(v) => Arg::new(v),
            ArgSlot::Short(v) => Arg::new(v),
            ArgSlot::Int(v) => Arg::new(v),
            ArgSlot::Long(v) => Arg::new(v),
            ArgSlot::Float(v) => Arg::new(v),
            ArgSlot::Double(v) => Arg::new(v),
            ArgSlot::Bool(v) => Arg::new(v),
            ArgSlot::WChar(v) => Arg::new(v),
            ArgSlot::Address(v) => Arg::new(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReturnKind {
    Void,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Bool,
    WChar,
    Address,
}

impl ReturnKind {
    fn of(ret: Option<&NativeLayout>) -> Self {
        match ret {
            None => ReturnKind::Void,
            Some(NativeLayout::Byte) => ReturnKind::Byte,
            Some(NativeLayout::Short) => ReturnKind::Short,
            Some(NativeLayout::Int) => ReturnKind::Int,
            Some(NativeLayout::Long) => ReturnKind::Long,
            Some(NativeLayout::Float) => ReturnKind::Float,
            Some(NativeLayout::Double) => ReturnKind::Double,
            Some(NativeLayout::Bool) => ReturnKind::Bool,
            Some(NativeLayout::WChar) => ReturnKind::WChar,
            Some(NativeLayout::Address | NativeLayout::Struct(_)) => ReturnKind::Address,
        }
    }
}

fn ffi_type(layout: &NativeLayout) -> Type {
    match layout {
        NativeLayout::Byte => Type::i8(),
        NativeLayout::Short => Type::i16(),
        NativeLayout::Int => Type::i32(),
        NativeLayout::Long => Type::i64(),
        NativeLayout::Float => Type::f32(),
        NativeLayout::Double => Type::f64(),
        NativeLayout::Bool => Type::u8(),
        NativeLayout::WChar => Type::u16(),
        NativeLayout::Address | NativeLayout::Struct(_) => Type::pointer(),
    }
}

/// A resolved entry point with its prepared call interface.
pub(crate) struct NativeFn {
    code: CodePtr,
    cif: Cif,
    params: Vec<NativeLayout>,
    ret: ReturnKind,
}

// SAFETY: the code pointer and CIF are immutable after construction. The
// CIF's type descriptors are owned by the CIF and only read during calls.
unsafe impl Send for NativeFn {}
unsafe impl Sync for NativeFn {}

impl NativeFn {
    pub(crate) fn new(address: NonNull<c_void>, signature: &CallSignature) -> Self {
        let ret_type = signature.ret.as_ref().map_or_else(Type::void, ffi_type);
        let cif = Cif::new(signature.params.iter().map(ffi_type), ret_type);
        Self {
            code: CodePtr::from_ptr(address.as_ptr()),
            cif,
            params: signature.params.clone(),
            ret: ReturnKind::of(signature.ret.as_ref()),
        }
    }

    pub(crate) fn params(&self) -> &[NativeLayout] {
        &self.params
    }

    /// # Safety
    ///
    /// `args` must match the signature the function was prepared with, and the
    /// native function must honor that signature. Addresses passed as
    /// arguments must be valid for whatever the function does with them.
    pub(crate) unsafe fn call(&self, args: &[Arg]) -> Value {
        let code = self.code;
        // SAFETY: forwarded to the caller.
        unsafe {
            match self.ret {
                ReturnKind::Void => {
                    self.cif.call::<()>(code, args);
                    Value::Void
                }
                ReturnKind::Byte => Value::Byte(self.cif.call::<i8>(code, args)),
                ReturnKind::Short => Value::Short(self.cif.call::<i16>(code, args)),
                ReturnKind::Int => Value::Int(self.cif.call::<i32>(code, args)),
                ReturnKind::Long => Value::Long(self.cif.call::<i64>(code, args)),
                ReturnKind::Float => Value::Float(self.cif.call::<f32>(code, args)),
                ReturnKind::Double => Value::Double(self.cif.call::<f64>(code, args)),
                ReturnKind::Bool => Value::Bool(self.cif.call::<u8>(code, args) != 0),
                ReturnKind::WChar => Value::WChar(self.cif.call::<u16>(code, args)),
                ReturnKind::Address => Value::Address(self.cif.call::<usize>(code, args)),
            }
        }
    }
}

/// A cached call path for a fixed argument count.
pub(crate) type InvokePath = Arc<dyn Fn(&[Value]) -> Result<Value, CallFailure> + Send + Sync>;

/// Builds the call path for `argc` arguments. Arities up to `max_arity`
/// encode into stack arrays; wider calls use the general path.
pub(crate) fn specialize(native: Arc<NativeFn>, argc: usize, max_arity: usize) -> InvokePath {
    if argc > max_arity.min(MAX_SPECIALIZED_ARITY) {
        return Arc::new(move |args: &[Value]| call_dynamic(&native, args));
    }
    match argc {
        0 => Arc::new(move |args: &[Value]| call_fixed::<0>(&native, args)),
        1 => Arc::new(move |args: &[Value]| call_fixed::<1>(&native, args)),
        2 => Arc::new(move |args: &[Value]| call_fixed::<2>(&native, args)),
        3 => Arc::new(move |args: &[Value]| call_fixed::<3>(&native, args)),
        4 => Arc::new(move |args: &[Value]| call_fixed::<4>(&native, args)),
        5 => Arc::new(move |args: &[Value]| call_fixed::<5>(&native, args)),
        6 => Arc::new(move |args: &[Value]| call_fixed::<6>(&native, args)),
        7 => Arc::new(move |args: &[Value]| call_fixed::<7>(&native, args)),
        8 => Arc::new(move |args: &[Value]| call_fixed::<8>(&native, args)),
        _ => Arc::new(move |args: &[Value]| call_dynamic(&native, args)),
    }
}

fn check_arity(expected: usize, found: usize) -> Result<(), CallFailure> {
    if expected != found {
        return Err(CallFailure::Arity { expected, found });
    }
    Ok(())
}

fn call_fixed<const N: usize>(native: &NativeFn, args: &[Value]) -> Result<Value, CallFailure> {
    check_arity(native.params().len(), args.len())?;
    check_arity(N, args.len())?;
    let mut slots = [ArgSlot::EMPTY; N];
    for (index, (slot, (layout, value))) in slots
        .iter_mut()
        .zip(native.params().iter().zip(args))
        .enumerate()
    {
        *slot = ArgSlot::encode(index, layout, value)?;
    }
    let ffi_args: [Arg; N] = std::array::from_fn(|i| slots[i].arg());
    // SAFETY: every slot was encoded against the prepared signature.
    Ok(unsafe { native.call(&ffi_args) })
}

pub(crate) fn call_dynamic(native: &NativeFn, args: &[Value]) -> Result<Value, CallFailure> {
    check_arity(native.params().len(), args.len())?;
    let slots = native
        .params()
        .iter()
        .zip(args)
        .enumerate()
        .map(|(index, (layout, value))| ArgSlot::encode(index, layout, value))
        .collect::<Result<Vec<_>, _>>()?;
    let ffi_args: Vec<Arg> = slots.iter().map(ArgSlot::arg).collect();
    // SAFETY: as in `call_fixed`.
    Ok(unsafe { native.call(&ffi_args) })
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    extern "C" fn scale(x: f64, factor: f32, negate: u8) -> f64 {
        let y = x * f64::from(factor);
        if negate != 0 { -y } else { y }
    }

    extern "C" fn sum8(a: i64, b: i64, c: i64, d: i64, e: i64, f: i64, g: i64, h: i64) -> i64 {
        a + b + c + d + e + f + g + h
    }

    fn native(
        address: *const c_void,
        params: Vec<NativeLayout>,
        ret: NativeLayout,
    ) -> Arc<NativeFn> {
        let signature = CallSignature {
            params,
            ret: Some(ret),
        };
        Arc::new(NativeFn::new(
            NonNull::new(address.cast_mut()).unwrap(),
            &signature,
        ))
    }

    #[test]
    fn fixed_and_dynamic_paths_agree() {
        let add = native(
            add as *const c_void,
            vec![NativeLayout::Int, NativeLayout::Int],
            NativeLayout::Int,
        );
        let args = [Value::Int(2), Value::Int(3)];
        let fast = specialize(add.clone(), 2, 6);
        assert_eq!(fast(&args).unwrap(), Value::Int(5));
        assert_eq!(call_dynamic(&add, &args).unwrap(), Value::Int(5));
        let slow = specialize(add, 2, 0);
        assert_eq!(slow(&[Value::Int(-1), Value::Int(1)]).unwrap(), Value::Int(0));
    }

    #[test]
    fn mixed_primitive_arguments() {
        let scale = native(
            scale as *const c_void,
            vec![NativeLayout::Double, NativeLayout::Float, NativeLayout::Bool],
            NativeLayout::Double,
        );
        let path = specialize(scale, 3, 6);
        let args = [Value::Double(1.5), Value::Float(2.0), Value::Bool(true)];
        assert_eq!(path(&args).unwrap(), Value::Double(-3.0));
    }

    #[test]
    fn widest_specialized_arity() {
        let sum = native(sum8 as *const c_void, vec![NativeLayout::Long; 8], NativeLayout::Long);
        let args: Vec<Value> = (1..=8).map(Value::Long).collect();
        let path = specialize(sum, 8, MAX_SPECIALIZED_ARITY);
        assert_eq!(path(&args).unwrap(), Value::Long(36));
    }

    #[test]
    fn argument_errors() {
        let add = native(
            add as *const c_void,
            vec![NativeLayout::Int, NativeLayout::Int],
            NativeLayout::Int,
        );
        let path = specialize(add, 2, 6);
        assert!(matches!(
            path(&[Value::Int(1)]),
            Err(CallFailure::Arity { expected: 2, found: 1 })
        ));
        let err = path(&[Value::Int(1), Value::Double(2.0)]).unwrap_err();
        assert!(matches!(
            err,
            CallFailure::ArgumentType { index: 1, ref expected, ref found }
                if expected == "int" && found == "double"
        ));
    }
}
