use std::fmt::{Debug, Display, Formatter};
use crate::helper::has_flag;
use crate::vm::class::access::AccessFlagMethod;
use crate::vm::class::class::ClassHandle;
use crate::vm::class::field::FieldType;

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub ret: FieldType
}

impl Display for MethodDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for p in &self.parameters {
            write!(f, "{}", p)?;
        }
        write!(f, "){}", self.ret)
    }
}

#[derive(Debug)]
pub struct Method {
    pub flag: u16,
    pub name: String,
    pub descriptor: MethodDescriptor,
    /// Slot in the virtual table of every class that inherits this method
    pub vtable_index: Option<usize>,
    /// Position among the methods of the declaring interface
    pub itable_index: Option<usize>,
}

impl Method {
    pub fn is_static(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_STATIC)
    }

    pub fn is_private(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_PRIVATE)
    }

    pub fn is_abstract(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_ABSTRACT)
    }

    pub fn is_initializer(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }

    /// Virtual dispatch applies to everything that is not static, private or a constructor.
    pub fn is_virtual(&self) -> bool {
        !self.is_static() && !self.is_private() && !self.is_initializer()
    }

    pub fn matches(&self, name: &str, descriptor: &MethodDescriptor) -> bool {
        self.name == name && &self.descriptor == descriptor
    }
}

/// A resolved method: declaring class plus index into its method table.
#[derive(Clone)]
pub struct MethodHandle {
    pub class: ClassHandle,
    pub index: usize,
}

impl MethodHandle {
    pub fn method(&self) -> &Method {
        &self.class.data.methods[self.index]
    }
}

impl PartialEq for MethodHandle {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.index == other.index
    }
}

impl Eq for MethodHandle {}

impl Display for MethodHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let method = self.method();
        write!(f, "{}.{}{}", self.class.data.name, method.name, method.descriptor)
    }
}

impl Debug for MethodHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
