use std::sync::Arc;
use crate::vm::class::class::{ClassHandle, ClassInitializer};
use crate::vm::class::constant_pool::JAVA_LANG_OBJECT;
use crate::vm::class::field::FieldType;
use crate::vm::class::method::MethodDescriptor;
use crate::vm::exception::Exception;

/// What a class loader knows about a class before it is loaded: names only, no links to other
/// classes. This is the shape the class-file parser hands over.
#[derive(Clone)]
pub struct ClassDefinition {
    pub name: String,
    pub flag: u16,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDefinition>,
    pub methods: Vec<MethodDefinition>,
    pub initializer: Option<ClassInitializer>,
}

#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub flag: u16,
    pub name: String,
    pub descriptor: FieldType,
}

#[derive(Debug, Clone)]
pub struct MethodDefinition {
    pub flag: u16,
    pub name: String,
    pub descriptor: MethodDescriptor,
}

impl ClassDefinition {
    /// A class extending `java/lang/Object` with the given access flags.
    pub fn new(name: &str, flag: u16) -> ClassDefinition {
        ClassDefinition {
            name: name.to_string(),
            flag,
            superclass: Some(JAVA_LANG_OBJECT.to_string()),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            initializer: None,
        }
    }

    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    pub fn root(mut self) -> Self {
        self.superclass = None;
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    /// Panics on a malformed descriptor; definitions are built by trusted code.
    pub fn field(mut self, name: &str, descriptor: &str, flag: u16) -> Self {
        let descriptor = FieldType::parse(descriptor)
            .unwrap_or_else(|| panic!("Malformed field descriptor {}", descriptor));
        self.fields.push(FieldDefinition { flag, name: name.to_string(), descriptor });
        self
    }

    /// Panics on a malformed descriptor; definitions are built by trusted code.
    pub fn method(mut self, name: &str, descriptor: &str, flag: u16) -> Self {
        let descriptor = MethodDescriptor::parse(descriptor)
            .unwrap_or_else(|| panic!("Malformed method descriptor {}", descriptor));
        self.methods.push(MethodDefinition { flag, name: name.to_string(), descriptor });
        self
    }

    pub fn initializer<F>(mut self, initializer: F) -> Self
        where F: Fn(&ClassHandle) -> Result<(), Exception> + Send + Sync + 'static {
        self.initializer = Some(Arc::new(initializer));
        self
    }
}
