use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::thread::ThreadId;
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use crate::helper::{has_flag, package_of};
use crate::vm::class::access::AccessFlagClass;
use crate::vm::class::field::{Field, FieldType, PrimitiveType};
use crate::vm::class::method::{Method, MethodDescriptor, MethodHandle};
use crate::vm::exception::Exception;

/// Identity of a class loader. Two classes are the same runtime class only if both the name and the
/// defining loader agree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(pub u32);

impl LoaderId {
    pub const BOOTSTRAP: LoaderId = LoaderId(0);
}

impl Display for LoaderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if *self == LoaderId::BOOTSTRAP {
            write!(f, "<bootstrap>")
        } else {
            write!(f, "loader#{}", self.0)
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ClassState {
    Linked,
    Initializing(ThreadId),
    Initialized,
    Erroneous,
}

/// Static initializer run by `initialize_class`; stands in for `<clinit>`.
pub type ClassInitializer = Arc<dyn Fn(&ClassHandle) -> Result<(), Exception> + Send + Sync>;

/// Runtime representation of a class in the method area
pub struct Class {
    pub state: Mutex<ClassState>,
    pub(crate) state_changed: Condvar,
    pub data: ClassRepr,
}

pub struct ClassRepr {
    pub name: String,
    pub loader: LoaderId,
    pub flag: u16,
    pub superclass: Option<ClassHandle>,
    pub interfaces: SmallVec<[ClassHandle; 4]>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub array: Option<ArrayDesc>,
    pub instance_size: usize,
    pub vtable_len: usize,
    pub static_fields: Box<[AtomicU64]>,
    pub initializer: Option<ClassInitializer>,
}

#[derive(Clone, Debug)]
pub enum Component {
    Primitive(PrimitiveType),
    Class(ClassHandle),
}

/// Shape of an array class. `element_*` describe the innermost non-array type.
#[derive(Clone, Debug)]
pub struct ArrayDesc {
    pub component: Component,
    pub dimension: u8,
    pub element_type: Option<PrimitiveType>,
    pub element_class: Option<ClassHandle>,
}

impl Class {
    pub fn new(data: ClassRepr, state: ClassState) -> Class {
        Class {
            state: Mutex::new(state),
            state_changed: Condvar::new(),
            data,
        }
    }
}

impl Debug for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {:?})", self.data.name, self.data.loader, self.state.try_lock().map(|s| *s))
    }
}

/// Concrete type used as "pointer" to a Class instance. Equality is identity.
#[derive(Clone)]
pub struct ClassHandle(pub Arc<Class>);

impl ClassHandle {
    pub fn new(class: Class) -> ClassHandle {
        ClassHandle(Arc::new(class))
    }

    pub fn ptr(&self) -> *const Class {
        Arc::as_ptr(&self.0)
    }

    pub fn is_interface(&self) -> bool {
        has_flag(self.data.flag, AccessFlagClass::ACC_INTERFACE)
    }

    pub fn is_public(&self) -> bool {
        has_flag(self.data.flag, AccessFlagClass::ACC_PUBLIC)
    }

    pub fn is_array(&self) -> bool {
        self.data.array.is_some()
    }

    pub fn package(&self) -> &str {
        package_of(&self.data.name)
    }

    /// Same runtime package: same package name and same defining loader.
    pub fn same_package(&self, other: &ClassHandle) -> bool {
        self.data.loader == other.data.loader && self.package() == other.package()
    }

    pub fn superclasses(&self) -> impl Iterator<Item = &ClassHandle> {
        std::iter::successors(Some(self), |c: &&ClassHandle| c.data.superclass.as_ref())
    }

    pub fn is_subclass_of(&self, other: &ClassHandle) -> bool {
        self.superclasses().any(|c| c == other)
    }

    /// Whether `iface` is among the superinterfaces of this class or any of its superclasses.
    pub fn implements(&self, iface: &ClassHandle) -> bool {
        self.superclasses().any(|c| {
            c.data.interfaces.iter().any(|i| i == iface || i.implements(iface))
        })
    }

    /// Class-level assignability for loaded classes, following the checkcast rules.
    pub fn is_assignable_to(&self, dest: &ClassHandle) -> bool {
        if self == dest {
            return true;
        }

        if dest.is_interface() {
            return self.implements(dest);
        }

        match (&self.data.array, &dest.data.array) {
            (Some(sub), Some(sup)) => match (&sub.component, &sup.component) {
                (Component::Class(a), Component::Class(b)) => a.is_assignable_to(b),
                _ => false
            },
            (Some(_), None) => dest.data.superclass.is_none(), // java/lang/Object
            (None, Some(_)) => false,
            (None, None) => self.is_subclass_of(dest)
        }
    }

    pub fn find_field(&self, name: &str, descriptor: &FieldType) -> Option<usize> {
        self.data.fields.iter().position(|f| &f.name == name && &f.descriptor == descriptor)
    }

    pub fn find_method(&self, name: &str, descriptor: &MethodDescriptor) -> Option<MethodHandle> {
        self.data.methods.iter().position(|m| m.matches(name, descriptor))
            .map(|index| MethodHandle { class: self.clone(), index })
    }

    /// Most derived method occupying `vtable_index`, i.e. what virtual dispatch on an instance of
    /// this class would invoke.
    pub fn vtable_entry(&self, vtable_index: usize) -> Option<MethodHandle> {
        self.superclasses().find_map(|c| {
            c.data.methods.iter().position(|m| m.vtable_index == Some(vtable_index))
                .map(|index| MethodHandle { class: c.clone(), index })
        })
    }
}

impl Deref for ClassHandle {
    type Target = Class;

    fn deref(&self) -> &Class {
        &self.0
    }
}

impl PartialEq for ClassHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ClassHandle {}

impl Hash for ClassHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.ptr(), state)
    }
}

impl Debug for ClassHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.data.name)
    }
}

impl Display for ClassHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.data.name)
    }
}
