use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use once_cell::sync::OnceCell;
use parking_lot::{ReentrantMutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use crate::throw;
use crate::vm::class::access::{AccessFlagClass, AccessFlagMethod};
use crate::vm::class::class::{Class, ClassHandle, ClassRepr, ClassState, Component, LoaderId};
use crate::vm::class::constant_pool::JAVA_LANG_OBJECT;
use crate::vm::class::definition::ClassDefinition;
use crate::vm::class::field::{Field, PrimitiveType};
use crate::vm::class::method::Method;
use crate::vm::class_loader::constraints::LoadingConstraints;
use crate::vm::exception::Exception;

pub const JAVA_LANG_CLONEABLE: &str = "java/lang/Cloneable";
pub const JAVA_IO_SERIALIZABLE: &str = "java/io/Serializable";
pub const JAVA_LANG_STRING: &str = "java/lang/String";

/// Bytes in front of the first instance field of every object
pub const OBJECT_HEADER_SIZE: usize = 16;
pub const FIELD_SLOT_SIZE: usize = 8;

const PUBLIC: u16 = AccessFlagClass::ACC_PUBLIC as u16;
const INTERFACE: u16 = AccessFlagClass::ACC_INTERFACE as u16 | AccessFlagClass::ACC_ABSTRACT as u16;

#[derive(Default)]
pub(super) struct LoaderData {
    parent: Option<LoaderId>,
    /// Looks at its own definitions before asking the parent
    child_first: bool,
    definitions: FxHashMap<String, ClassDefinition>,
    /// Classes this loader is an initiating loader for, including the ones it defined
    pub(super) loaded: FxHashMap<String, ClassHandle>,
}

/// The method area: every class loader known to the runtime together with the classes it can
/// define and the classes it has loaded so far.
pub struct ClassArea {
    pub(super) loaders: RwLock<FxHashMap<LoaderId, LoaderData>>,
    // Loading is serialised; the set holds the classes currently being defined so that a class
    // reaching itself through its supertypes is detected.
    load_lock: ReentrantMutex<RefCell<FxHashSet<(LoaderId, String)>>>,
    constraints: Arc<LoadingConstraints>,
    next_loader: AtomicU32,
    loads: AtomicUsize,
    object_class: OnceCell<ClassHandle>,
    array_stub: OnceCell<ClassHandle>,
}

impl ClassArea {
    pub fn new(constraints: Arc<LoadingConstraints>) -> Result<ClassArea, Exception> {
        let mut loaders = FxHashMap::default();
        loaders.insert(LoaderId::BOOTSTRAP, LoaderData::default());

        let area = ClassArea {
            loaders: RwLock::new(loaders),
            load_lock: ReentrantMutex::new(RefCell::new(FxHashSet::default())),
            constraints,
            next_loader: AtomicU32::new(1),
            loads: AtomicUsize::new(0),
            object_class: OnceCell::new(),
            array_stub: OnceCell::new(),
        };
        area.load_bootstrap_classes()?;

        Ok(area)
    }

    fn load_bootstrap_classes(&self) -> Result<(), Exception> {
        let public = AccessFlagMethod::ACC_PUBLIC as u16;
        let protected = AccessFlagMethod::ACC_PROTECTED as u16;

        let object = ClassDefinition::new(JAVA_LANG_OBJECT, PUBLIC).root()
            .method("<init>", "()V", public)
            .method("equals", "(Ljava/lang/Object;)Z", public)
            .method("hashCode", "()I", public)
            .method("toString", "()Ljava/lang/String;", public)
            .method("clone", "()Ljava/lang/Object;", protected);
        let cloneable = ClassDefinition::new(JAVA_LANG_CLONEABLE, PUBLIC | INTERFACE);
        let serializable = ClassDefinition::new(JAVA_IO_SERIALIZABLE, PUBLIC | INTERFACE);
        let string = ClassDefinition::new(JAVA_LANG_STRING,
                                          PUBLIC | AccessFlagClass::ACC_FINAL as u16)
            .implements(JAVA_IO_SERIALIZABLE)
            .field("length", "J", 0)
            .field("value", "[C", 0)
            .method("<init>", "()V", public)
            .method("length", "()I", public)
            .method("charAt", "(I)C", public)
            .method("concat", "(Ljava/lang/String;)Ljava/lang/String;", public)
            .method("equals", "(Ljava/lang/Object;)Z", public)
            .method("toString", "()Ljava/lang/String;", public);

        for definition in [object, cloneable, serializable, string] {
            let name = definition.name.clone();
            self.add_definition(LoaderId::BOOTSTRAP, definition);
            let class = self.load_class(LoaderId::BOOTSTRAP, &name)?;
            *class.state.lock() = ClassState::Initialized;

            if name == JAVA_LANG_OBJECT {
                let _ = self.object_class.set(class);
            }
        }

        for primitive in PrimitiveType::ALL {
            let class = self.make_array_class(primitive.array_class_name(), LoaderId::BOOTSTRAP,
                                              PUBLIC, Component::Primitive(primitive))?;
            self.record_loaded(LoaderId::BOOTSTRAP, class)?;
        }

        // Common supertype of arrays that cannot be merged into a more precise array type
        let stub = ClassHandle::new(Class::new(ClassRepr {
            name: "$ARRAYSTUB$".to_string(),
            loader: LoaderId::BOOTSTRAP,
            flag: PUBLIC | AccessFlagClass::ACC_ABSTRACT as u16,
            superclass: Some(self.java_lang_object()?),
            interfaces: self.array_interfaces()?,
            fields: vec![],
            methods: vec![],
            array: None,
            instance_size: OBJECT_HEADER_SIZE,
            vtable_len: 0,
            static_fields: Box::new([]),
            initializer: None
        }, ClassState::Initialized));
        let _ = self.array_stub.set(stub);

        self.loads.store(0, Ordering::Release);
        Ok(())
    }

    pub fn constraints(&self) -> &Arc<LoadingConstraints> {
        &self.constraints
    }

    pub fn java_lang_object(&self) -> Result<ClassHandle, Exception> {
        self.object_class.get().cloned()
            .ok_or_else(|| throw!(NoClassDefFound, "{}", JAVA_LANG_OBJECT))
    }

    pub fn array_stub(&self) -> Result<ClassHandle, Exception> {
        self.array_stub.get().cloned()
            .ok_or_else(|| throw!(NoClassDefFound, "array stub"))
    }

    /// Number of classes defined from definitions since the bootstrap classes were set up
    pub fn loads_performed(&self) -> usize {
        self.loads.load(Ordering::Acquire)
    }

    /// Registers a new class loader delegating to `parent` (the bootstrap loader if `None`).
    pub fn add_loader(&self, parent: Option<LoaderId>) -> LoaderId {
        self.register_loader(parent, false)
    }

    /// Like `add_loader`, but the loader prefers its own definitions over its parent's.
    pub fn add_child_first_loader(&self, parent: Option<LoaderId>) -> LoaderId {
        self.register_loader(parent, true)
    }

    fn register_loader(&self, parent: Option<LoaderId>, child_first: bool) -> LoaderId {
        let id = LoaderId(self.next_loader.fetch_add(1, Ordering::AcqRel));
        let data = LoaderData {
            parent: Some(parent.unwrap_or(LoaderId::BOOTSTRAP)),
            child_first,
            ..Default::default()
        };
        self.loaders.write().insert(id, data);

        id
    }

    /// Makes `definition` loadable by `loader`. Has no effect on a class already loaded.
    pub fn add_definition(&self, loader: LoaderId, definition: ClassDefinition) {
        let mut loaders = self.loaders.write();
        if let Some(data) = loaders.get_mut(&loader) {
            data.definitions.insert(definition.name.clone(), definition);
        }
    }

    /// Looks `name` up among the classes `loader` has already loaded. Never loads anything, but
    /// materialises array classes whose element type is already loaded.
    pub fn find_loaded_class(&self, loader: LoaderId, name: &str) -> Option<ClassHandle> {
        if let Some(class) = self.loaders.read().get(&loader)
            .and_then(|data| data.loaded.get(name)) {
            return Some(class.clone());
        }

        let component = name.strip_prefix('[')?;
        if component.len() == 1 {
            // primitive arrays only ever live in the bootstrap loader
            return self.loaders.read().get(&LoaderId::BOOTSTRAP)
                .and_then(|data| data.loaded.get(name).cloned());
        }

        let component = if component.starts_with('[') {
            self.find_loaded_class(loader, component)?
        } else {
            let element = component.strip_prefix('L')?.strip_suffix(';')?;
            self.find_loaded_class(loader, element)?
        };

        self.array_of(&component).ok()
    }

    /// Loads (and links) `name` through `loader`, delegating to the parent loaders.
    pub fn load_class(&self, loader: LoaderId, name: &str) -> Result<ClassHandle, Exception> {
        if let Some(class) = self.find_loaded_class(loader, name) {
            return Ok(class);
        }

        if let Some(component) = name.strip_prefix('[') {
            return self.load_array_class(loader, name, component);
        }

        let _guard = self.load_lock.lock();
        if let Some(class) = self.find_loaded_class(loader, name) {
            return Ok(class);
        }

        let defining = self.defining_loader(loader, name)
            .ok_or_else(|| throw!(NoClassDefFound, "{} (initiating loader {})", name, loader))?;

        let class = if defining == loader {
            self.define_class(loader, name)?
        } else {
            let class = self.load_class(defining, name)?;
            self.record_loaded(loader, class.clone())?;
            class
        };

        Ok(class)
    }

    fn load_array_class(&self, loader: LoaderId, name: &str, component: &str)
        -> Result<ClassHandle, Exception> {
        let component = if component.starts_with('[') {
            self.load_class(loader, component)?
        } else if let Some(element) = component.strip_prefix('L').and_then(|c| c.strip_suffix(';')) {
            self.load_class(loader, element)?
        } else {
            // primitive arrays are created with the bootstrap classes
            return self.find_loaded_class(LoaderId::BOOTSTRAP, name)
                .ok_or_else(|| throw!(NoClassDefFound, "{}", name));
        };

        self.array_of(&component)
    }

    /// Search along the delegation chain for the loader that holds a definition of `name`.
    fn defining_loader(&self, loader: LoaderId, name: &str) -> Option<LoaderId> {
        let loaders = self.loaders.read();
        let knows = |id: &LoaderId| loaders.get(id).map_or(false, |data| {
            data.definitions.contains_key(name) || data.loaded.contains_key(name)
        });

        if loaders.get(&loader).map_or(false, |data| data.child_first) && knows(&loader) {
            return Some(loader);
        }

        let mut chain: SmallVec<[LoaderId; 4]> = SmallVec::new();
        let mut current = Some(loader);
        while let Some(id) = current {
            if chain.contains(&id) {
                break;
            }
            chain.push(id);
            current = loaders.get(&id).and_then(|data| data.parent);
        }

        chain.iter().rev().copied().find(|id| knows(id))
    }

    fn define_class(&self, loader: LoaderId, name: &str) -> Result<ClassHandle, Exception> {
        let guard = self.load_lock.lock();
        let key = (loader, name.to_string());
        if !guard.borrow_mut().insert(key.clone()) {
            return Err(throw!(ClassCircularity, "{}", name));
        }

        let result = self.derive_class(loader, name);
        guard.borrow_mut().remove(&key);

        let class = result?;
        self.record_loaded(loader, class.clone())?;
        self.loads.fetch_add(1, Ordering::AcqRel);

        log::debug!("Loaded {} by {}", name, loader);
        Ok(class)
    }

    fn derive_class(&self, loader: LoaderId, name: &str) -> Result<ClassHandle, Exception> {
        let definition = self.loaders.read().get(&loader)
            .and_then(|data| data.definitions.get(name).cloned())
            .ok_or_else(|| throw!(NoClassDefFound, "{}", name))?;
        let is_interface = definition.flag & AccessFlagClass::ACC_INTERFACE as u16 != 0;

        let superclass = match &definition.superclass {
            Some(superclass_name) => {
                let superclass = self.load_class(loader, superclass_name)?;
                if superclass.is_interface() {
                    return Err(throw!(IncompatibleClassChange,
                        "class {} has interface {} as super class", name, superclass_name));
                }
                Some(superclass)
            }
            None if name == JAVA_LANG_OBJECT && loader == LoaderId::BOOTSTRAP => None,
            None => return Err(throw!(NoClassDefFound, "{} has no superclass", name))
        };

        let mut interfaces = SmallVec::new();
        for interface_name in &definition.interfaces {
            let interface = self.load_class(loader, interface_name)?;
            if !interface.is_interface() {
                return Err(throw!(IncompatibleClassChange,
                    "class {} can not implement {}, because it is not an interface", name,
                    interface_name));
            }
            interfaces.push(interface);
        }

        // Instance fields are laid out after the ones inherited from the superclass
        let mut instance_size = superclass.as_ref()
            .map_or(OBJECT_HEADER_SIZE, |s| s.data.instance_size);
        let mut static_count = 0;
        let fields: Vec<Field> = definition.fields.iter().map(|f| {
            let mut field = Field {
                flag: f.flag,
                name: f.name.clone(),
                descriptor: f.descriptor.clone(),
                offset: 0
            };
            if field.is_static() {
                field.offset = static_count;
                static_count += 1;
            } else {
                field.offset = instance_size;
                instance_size += FIELD_SLOT_SIZE;
            }
            field
        }).collect();

        let mut vtable_len = superclass.as_ref().map_or(0, |s| s.data.vtable_len);
        let mut itable_len = 0;
        let methods = definition.methods.iter().map(|m| {
            let mut method = Method {
                flag: m.flag,
                name: m.name.clone(),
                descriptor: m.descriptor.clone(),
                vtable_index: None,
                itable_index: None
            };

            if is_interface {
                if method.is_virtual() {
                    method.itable_index = Some(itable_len);
                    itable_len += 1;
                }
            } else if method.is_virtual() {
                let overridden = superclass.as_ref().and_then(|s| {
                    s.superclasses()
                        .flat_map(|c| c.data.methods.iter())
                        .find(|o| o.is_virtual() && o.matches(&method.name, &method.descriptor))
                        .and_then(|o| o.vtable_index)
                });
                method.vtable_index = Some(overridden.unwrap_or_else(|| {
                    vtable_len += 1;
                    vtable_len - 1
                }));
            }
            method
        }).collect();

        let static_fields = (0..static_count).map(|_| AtomicU64::new(0)).collect();

        let class = Class::new(ClassRepr {
            name: name.to_string(),
            loader,
            flag: definition.flag,
            superclass,
            interfaces,
            fields,
            methods,
            array: None,
            instance_size,
            vtable_len,
            static_fields,
            initializer: definition.initializer.clone()
        }, ClassState::Linked);

        Ok(ClassHandle::new(class))
    }

    fn record_loaded(&self, loader: LoaderId, class: ClassHandle) -> Result<(), Exception> {
        self.constraints.check_loaded(loader, &class, || {
            let mut loaders = self.loaders.write();
            let data = loaders.get_mut(&loader)
                .ok_or_else(|| throw!(NoClassDefFound, "unknown class loader {}", loader))?;
            data.loaded.entry(class.data.name.clone()).or_insert_with(|| class.clone());

            Ok(())
        })
    }
}
