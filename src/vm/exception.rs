use strum_macros::{Display, IntoStaticStr};

/// Java-level throwable classes the linker can raise. `Display` yields the internal class name that
/// is thrown at the originating bytecode instruction.
#[derive(Display, IntoStaticStr, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    #[strum(serialize = "java/lang/IllegalAccessError")]
    IllegalAccess,
    #[strum(serialize = "java/lang/LinkageError")]
    LinkageError,
    #[strum(serialize = "java/lang/IncompatibleClassChangeError")]
    IncompatibleClassChange,
    #[strum(serialize = "java/lang/NoSuchFieldError")]
    NoSuchField,
    #[strum(serialize = "java/lang/NoSuchMethodError")]
    NoSuchMethod,
    #[strum(serialize = "java/lang/AbstractMethodError")]
    AbstractMethod,
    #[strum(serialize = "java/lang/NoClassDefFoundError")]
    NoClassDefFound,
    #[strum(serialize = "java/lang/ClassNotFoundException")]
    ClassNotFound,
    #[strum(serialize = "java/lang/ClassCircularityError")]
    ClassCircularity,
    #[strum(serialize = "java/lang/VerifyError")]
    VerifyError,
    #[strum(serialize = "java/lang/ExceptionInInitializerError")]
    ExceptionInInitializer,
    #[strum(serialize = "java/lang/InstantiationError")]
    Instantiation,
    #[strum(serialize = "java/lang/OutOfMemoryError")]
    OutOfMemory,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct Exception {
    pub kind: ExceptionKind,
    pub message: String,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Exception {
        Exception { kind, message: message.into() }
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.into()
    }
}

/// Shorthand used across the linker: `throw!(NoSuchField, "{}.{}", class, name)`.
#[macro_export]
macro_rules! throw {
    ($kind: ident, $($arg: tt)*) => {
        $crate::vm::exception::Exception::new(
            $crate::vm::exception::ExceptionKind::$kind, format!($($arg)*))
    }
}
