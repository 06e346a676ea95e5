use std::fmt::{Display, Formatter};
use crate::vm::class::class::ClassHandle;
use crate::vm::class::field::FieldType;
use crate::vm::class::method::MethodDescriptor;
use crate::vm::class_loader::bootstrap::ClassArea;

pub const JAVA_LANG_OBJECT: &str = "java/lang/Object";

/// Symbolic reference to a class as found in the constant pool of `referer`. The referring class
/// decides which loader the name is looked up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRef {
    pub referer: ClassHandle,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub class: ClassRef,
    pub name: String,
    pub descriptor: FieldType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRef {
    pub class: ClassRef,
    pub name: String,
    pub descriptor: MethodDescriptor,
    /// Came from a `CONSTANT_InterfaceMethodref` entry
    pub is_interface: bool,
}

impl ClassRef {
    pub fn new(referer: &ClassHandle, name: impl Into<String>) -> ClassRef {
        ClassRef { referer: referer.clone(), name: name.into() }
    }
}

impl FieldRef {
    pub fn new(class: ClassRef, name: impl Into<String>, descriptor: FieldType) -> FieldRef {
        FieldRef { class, name: name.into(), descriptor }
    }

    /// Class reference for the declared type of the field, `None` for primitive fields.
    pub fn type_ref(&self) -> Option<ClassRef> {
        self.descriptor.class_name().map(|name| ClassRef::new(&self.class.referer, name))
    }
}

impl MethodRef {
    pub fn new(class: ClassRef, name: impl Into<String>, descriptor: MethodDescriptor)
        -> MethodRef {
        MethodRef { class, name: name.into(), descriptor, is_interface: false }
    }

    pub fn interface(class: ClassRef, name: impl Into<String>, descriptor: MethodDescriptor)
        -> MethodRef {
        MethodRef { class, name: name.into(), descriptor, is_interface: true }
    }

    pub fn parameter_ref(&self, index: usize) -> Option<ClassRef> {
        self.descriptor.parameters.get(index)?.class_name()
            .map(|name| ClassRef::new(&self.class.referer, name))
    }
}

impl Display for ClassRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Display for FieldRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}:{}", self.class.name, self.name, self.descriptor)
    }
}

impl Display for MethodRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.class.name, self.name, self.descriptor)
    }
}

/// Either an already loaded class or a symbolic reference that has not been looked at yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassOrRef {
    Class(ClassHandle),
    Ref(ClassRef),
}

impl ClassOrRef {
    pub fn name(&self) -> &str {
        match self {
            ClassOrRef::Class(class) => &class.data.name,
            ClassOrRef::Ref(class_ref) => &class_ref.name,
        }
    }

    pub fn is_object(&self) -> bool {
        self.name() == JAVA_LANG_OBJECT
    }

    /// The loaded class this stands for, if its identity is already known. Never loads.
    pub fn loaded(&self, classes: &ClassArea) -> Option<ClassHandle> {
        match self {
            ClassOrRef::Class(class) => Some(class.clone()),
            ClassOrRef::Ref(class_ref) =>
                classes.find_loaded_class(class_ref.referer.data.loader, &class_ref.name),
        }
    }
}

impl From<ClassHandle> for ClassOrRef {
    fn from(class: ClassHandle) -> Self {
        ClassOrRef::Class(class)
    }
}

impl From<ClassRef> for ClassOrRef {
    fn from(class_ref: ClassRef) -> Self {
        ClassOrRef::Ref(class_ref)
    }
}

impl Display for ClassOrRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
