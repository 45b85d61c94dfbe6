//! Typed facades over bound contracts.

/// Declares a typed native contract.
///
/// The generated struct wraps a [`BoundContract`](crate::BoundContract) and
/// has one method per declared function. Parameters implement
/// [`NativeArg`](crate::typing::NativeArg) and the return type implements
/// [`NativeReturn`](crate::typing::NativeReturn); struct parameters taken as
/// `&mut T` see what the native side wrote.
///
/// ```
/// use nbind_ffi_call::{Engine, SymbolTable, native_contract};
///
/// extern "C" fn add(a: i32, b: i32) -> i32 {
///     a + b
/// }
///
/// native_contract! {
///     pub contract Arith {
///         fn Add(a: i32, b: i32) -> i32;
///     }
/// }
///
/// let table = SymbolTable::new("doc").with("Add", add as *const _);
/// let arith = Arith::bind(&Engine::default(), &table).unwrap();
/// assert_eq!(arith.Add(2, 3).unwrap(), 5);
/// ```
#[macro_export]
macro_rules! native_contract {
    (
        $(#[$meta:meta])*
        $vis:vis contract $name:ident {
            $(
                $(#[$mmeta:meta])*
                fn $method:ident ( $($param:ident : $pty:ty),* $(,)? ) -> $ret:ty ;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            bound: ::std::sync::Arc<$crate::BoundContract>,
        }

        impl $name {
            /// The untyped declaration of this contract.
            pub fn contract() -> $crate::typing::Contract {
                $crate::typing::Contract::new(stringify!($name))
                    $(.method(
                        stringify!($method),
                        vec![$(<$pty as $crate::typing::NativeArg>::semantic_type()),*],
                        <$ret as $crate::typing::NativeReturn>::semantic_type(),
                    ))*
            }

            /// Registers every struct type the contract mentions.
            pub fn declare(
                registry: &$crate::typing::TypeRegistry,
            ) -> ::std::result::Result<(), $crate::typing::RegistryError> {
                $(
                    $(<$pty as $crate::typing::NativeArg>::declare_dependencies(registry)?;)*
                    <$ret as $crate::typing::NativeReturn>::declare_dependencies(registry)?;
                )*
                Ok(())
            }

            pub fn bind(
                engine: &$crate::Engine,
                source: &dyn $crate::SymbolSource,
            ) -> ::std::result::Result<Self, $crate::BindError> {
                Self::declare(engine.types())?;
                let bound = engine.bind(&Self::contract(), source)?;
                Ok(Self { bound })
            }

            pub fn bound(&self) -> &$crate::BoundContract {
                &self.bound
            }

            $(
                $(#[$mmeta])*
                #[allow(non_snake_case, unused_mut, unused_variables, clippy::too_many_arguments)]
                pub fn $method(
                    &self,
                    $($param: $pty),*
                ) -> ::std::result::Result<$ret, $crate::InvocationError> {
                    $(let mut $param = $param;)*
                    let mut args: ::std::vec::Vec<$crate::typing::Value> =
                        vec![$($crate::typing::NativeArg::to_arg(&$param)),*];
                    let returned = self.bound.invoke(stringify!($method), &mut args)?;
                    let mut written = args.into_iter();
                    $(
                        if let Some(value) = written.next() {
                            $crate::typing::NativeArg::write_back(&mut $param, value).map_err(
                                |err| $crate::InvocationError::marshal(stringify!($method), err),
                            )?;
                        }
                    )*
                    <$ret as $crate::typing::NativeReturn>::from_return(returned)
                        .map_err(|err| $crate::InvocationError::marshal(stringify!($method), err))
                }
            )*
        }
    };
}
