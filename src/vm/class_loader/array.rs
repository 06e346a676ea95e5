use smallvec::SmallVec;
use crate::throw;
use crate::vm::class::access::AccessFlagClass;
use crate::vm::class::class::{ArrayDesc, Class, ClassHandle, ClassRepr, ClassState, Component, LoaderId};
use crate::vm::class_loader::bootstrap::{ClassArea, JAVA_IO_SERIALIZABLE, JAVA_LANG_CLONEABLE,
                                         OBJECT_HEADER_SIZE};
use crate::vm::exception::Exception;

impl ClassArea {
    pub(super) fn array_interfaces(&self) -> Result<SmallVec<[ClassHandle; 4]>, Exception> {
        let mut interfaces = SmallVec::new();
        for name in [JAVA_LANG_CLONEABLE, JAVA_IO_SERIALIZABLE] {
            interfaces.push(self.find_loaded_class(LoaderId::BOOTSTRAP, name)
                .ok_or_else(|| throw!(NoClassDefFound, "{}", name))?);
        }
        Ok(interfaces)
    }

    pub(super) fn make_array_class(&self, name: String, loader: LoaderId, flag: u16, component: Component)
        -> Result<ClassHandle, Exception> {
        let array = match &component {
            Component::Primitive(p) => ArrayDesc {
                component: component.clone(),
                dimension: 1,
                element_type: Some(*p),
                element_class: None
            },
            Component::Class(class) => match &class.data.array {
                Some(inner) => ArrayDesc {
                    component: component.clone(),
                    dimension: inner.dimension.checked_add(1)
                        .ok_or_else(|| throw!(ClassNotFound, "{}: too many dimensions", name))?,
                    element_type: inner.element_type,
                    element_class: inner.element_class.clone()
                },
                None => ArrayDesc {
                    component: component.clone(),
                    dimension: 1,
                    element_type: None,
                    element_class: Some(class.clone())
                }
            }
        };

        Ok(ClassHandle::new(Class::new(ClassRepr {
            name,
            loader,
            flag: flag | AccessFlagClass::ACC_FINAL as u16 | AccessFlagClass::ACC_ABSTRACT as u16,
            superclass: Some(self.java_lang_object()?),
            interfaces: self.array_interfaces()?,
            fields: vec![],
            methods: vec![],
            array: Some(array),
            instance_size: OBJECT_HEADER_SIZE,
            vtable_len: self.java_lang_object()?.data.vtable_len,
            static_fields: Box::new([]),
            initializer: None
        }, ClassState::Initialized)))
    }

    /// The array class with `component` as component type, created on first request. Array
    /// classes are defined by the loader of their component and share its accessibility.
    pub fn array_of(&self, component: &ClassHandle) -> Result<ClassHandle, Exception> {
        let name = if component.is_array() {
            format!("[{}", component.data.name)
        } else {
            format!("[L{};", component.data.name)
        };
        let loader = component.data.loader;

        if let Some(class) = self.loaders.read().get(&loader).and_then(|d| d.loaded.get(&name)) {
            return Ok(class.clone());
        }

        let flag = component.data.flag & AccessFlagClass::ACC_PUBLIC as u16;
        let class = self.make_array_class(name.clone(), loader, flag,
                                          Component::Class(component.clone()))?;

        let mut loaders = self.loaders.write();
        let data = loaders.get_mut(&loader)
            .ok_or_else(|| throw!(NoClassDefFound, "unknown class loader {}", loader))?;

        // Another thread may have won the race while the lock was released
        Ok(data.loaded.entry(name).or_insert(class).clone())
    }
}
