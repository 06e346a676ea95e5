use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use rustc_hash::FxHashSet;
use crate::helper::has_flag;
use crate::throw;
use crate::vm::class::access::AccessFlagMethod;
use crate::vm::class::class::ClassHandle;
use crate::vm::class::constant_pool::{ClassOrRef, ClassRef};
use crate::vm::class::field::{FieldHandle, FieldType};
use crate::vm::class::method::{MethodDescriptor, MethodHandle};
use crate::vm::class_loader::access::{check_member_access, is_accessible_class, MemberAccess};
use crate::vm::class_loader::bootstrap::ClassArea;
use crate::vm::exception::{Exception, ExceptionKind};
use crate::vm::verify::subtype_set::SubtypeConstraintSet;
use crate::vm::verify::typeinfo::{Assignable, TypeInfo};
use crate::vm::verify::unresolved::{UnresolvedClass, UnresolvedField, UnresolvedMethod};

/// Under `Lazy` a missing class makes the whole resolution answer `Ok(None)`; it is repeated from
/// the start later.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResolveMode {
    /// Never load; answer `None` when a class is missing
    Lazy,
    /// Load whatever is needed
    Eager,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Log every successful resolution at info level
    pub verbose: bool,
    /// Record loading constraints between the referring and the declaring loader
    pub loading_constraints: bool,
    /// Treat every request as `Eager`
    pub eager: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig { verbose: false, loading_constraints: true, eager: false }
    }
}

/// Counters of resolution attempts, including the ones that were deferred or failed.
#[derive(Debug, Default)]
pub struct ResolverStats {
    classes: AtomicUsize,
    fields: AtomicUsize,
    methods: AtomicUsize,
    deferred: AtomicUsize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub classes: usize,
    pub fields: usize,
    pub methods: usize,
    pub deferred: usize,
}

impl ResolverStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            classes: self.classes.load(Ordering::Acquire),
            fields: self.fields.load(Ordering::Acquire),
            methods: self.methods.load(Ordering::Acquire),
            deferred: self.deferred.load(Ordering::Acquire),
        }
    }
}

pub struct Resolver {
    classes: Arc<ClassArea>,
    config: ResolverConfig,
    stats: ResolverStats,
}

/// Unwraps a lazy result, returning `Ok(None)` from the enclosing function on deferral.
macro_rules! defer {
    ($self: ident, $e: expr) => {
        match $e? {
            Some(value) => value,
            None => {
                $self.stats.deferred.fetch_add(1, Ordering::AcqRel);
                return Ok(None);
            }
        }
    }
}

impl Resolver {
    pub fn new(classes: Arc<ClassArea>, config: ResolverConfig) -> Resolver {
        Resolver { classes, config, stats: Default::default() }
    }

    pub fn classes(&self) -> &Arc<ClassArea> {
        &self.classes
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn effective(&self, mode: ResolveMode) -> ResolveMode {
        if self.config.eager { ResolveMode::Eager } else { mode }
    }

    fn report(&self, what: &dyn std::fmt::Display, result: &dyn std::fmt::Display) {
        if self.config.verbose {
            log::info!("Resolved {} to {}", what, result);
        } else {
            log::debug!("Resolved {} to {}", what, result);
        }
    }

    /// Looks `name` up with the loader of `referer`. Array names resolve their component first.
    pub fn resolve_class_from_name(&self, referer: &ClassHandle, refmethod: Option<&MethodHandle>,
                                   name: &str, mode: ResolveMode, check_access: bool)
        -> Result<Option<ClassHandle>, Exception> {
        let mode = self.effective(mode);
        let loader = referer.data.loader;

        let class = match name.strip_prefix('[') {
            // primitive arrays always exist
            Some(component) if component.len() == 1 => self.classes.load_class(loader, name)?,
            Some(component) => {
                let component = match component.strip_prefix('L') {
                    Some(element) => element.strip_suffix(';')
                        .ok_or_else(|| throw!(NoClassDefFound, "{}", name))?,
                    None => component
                };
                let component = match self.resolve_class_from_name(referer, refmethod, component,
                                                                   mode, false)? {
                    Some(component) => component,
                    None => return Ok(None)
                };
                self.classes.array_of(&component)?
            }
            None => match self.classes.find_loaded_class(loader, name) {
                Some(class) => class,
                None if mode == ResolveMode::Lazy => {
                    log::trace!("Deferring {} from {}", name, referer);
                    return Ok(None);
                }
                None => self.classes.load_class(loader, name)?
            }
        };

        if check_access && !is_accessible_class(referer, &class) {
            return Err(throw!(IllegalAccess, "class {}{} cannot access class {}", referer,
                refmethod.map(|m| format!(" (in {})", m)).unwrap_or_default(), class));
        }

        Ok(Some(class))
    }

    pub fn resolve_classref(&self, classref: &ClassRef, refmethod: Option<&MethodHandle>,
                            mode: ResolveMode, check_access: bool)
        -> Result<Option<ClassHandle>, Exception> {
        self.resolve_class_from_name(&classref.referer, refmethod, &classref.name, mode,
                                     check_access)
    }

    pub fn resolve_class_or_ref(&self, class: &ClassOrRef, refmethod: Option<&MethodHandle>,
                                mode: ResolveMode, check_access: bool)
        -> Result<Option<ClassHandle>, Exception> {
        match class {
            ClassOrRef::Class(class) => Ok(Some(class.clone())),
            ClassOrRef::Ref(classref) => self.resolve_classref(classref, refmethod, mode,
                                                               check_access),
        }
    }

    /// Checks every member of `set` against `typeref`: members must be assignable to it, or with
    /// `reversed` it must be assignable to every member. A failing member raises `error`.
    ///
    /// `Some(true)` once everything is checked, `None` if a class needed for that is not loaded.
    pub fn resolve_and_check_subtype_set(&self, referer: &ClassHandle,
                                         refmethod: Option<&MethodHandle>,
                                         set: &SubtypeConstraintSet, typeref: &ClassOrRef,
                                         reversed: bool, mode: ResolveMode, error: ExceptionKind)
        -> Result<Option<bool>, Exception> {
        if set.is_empty() {
            return Ok(Some(true));
        }

        let ty = defer!(self, self.resolve_class_or_ref(typeref, refmethod, mode, false));
        // the verifier treats interface types like Object; invokeinterface checks at run time
        if !reversed && ty.is_interface() {
            log::trace!("Skipping subtype check against interface {}", ty);
            return Ok(Some(true));
        }

        for member in set.iter() {
            let class = defer!(self, self.resolve_class_or_ref(member, refmethod, mode, false));

            let (value, dest) = if reversed { (&ty, &class) } else { (&class, &ty) };
            let result = TypeInfo::from_class(value)
                .is_assignable_to_class(&ClassOrRef::Class(dest.clone()), &self.classes);

            match result {
                Assignable::Yes => {}
                Assignable::No | Assignable::Maybe => return Err(Exception::new(error, format!(
                    "{} is not assignable to {} (referenced from {})", value, dest, referer)))
            }
        }

        Ok(Some(true))
    }

    pub fn resolve_class(&self, reference: &UnresolvedClass, mode: ResolveMode)
        -> Result<Option<ClassHandle>, Exception> {
        self.stats.classes.fetch_add(1, Ordering::AcqRel);
        let refmethod = Some(&reference.referer_method);

        let class = defer!(self, self.resolve_classref(&reference.classref, refmethod, mode, true));
        defer!(self, self.resolve_and_check_subtype_set(reference.referer(), refmethod,
            &reference.subtype_constraints, &ClassOrRef::Class(class.clone()), false, mode,
            ExceptionKind::LinkageError));

        self.report(reference, &class);
        Ok(Some(class))
    }

    pub fn resolve_field(&self, reference: &UnresolvedField, mode: ResolveMode)
        -> Result<Option<FieldHandle>, Exception> {
        self.stats.fields.fetch_add(1, Ordering::AcqRel);
        let fieldref = &reference.fieldref;
        let referer = reference.referer();
        let refmethod = Some(&reference.referer_method);

        let container = defer!(self, self.resolve_classref(&fieldref.class, refmethod, mode, true));

        let field = lookup_field(&container, &fieldref.name, &fieldref.descriptor)
            .ok_or_else(|| throw!(NoSuchField, "{}", fieldref))?;
        let declaring = field.class.clone();
        let is_static = field.field().is_static();

        if is_static != reference.is_static() {
            return Err(throw!(IncompatibleClassChange, "Expected {} field {}",
                if reference.is_static() { "static" } else { "non-static" }, field));
        }

        if !is_static {
            defer!(self, self.resolve_and_check_subtype_set(referer, refmethod,
                &reference.instance_types, &ClassOrRef::Class(declaring.clone()), false, mode,
                ExceptionKind::LinkageError));
        }

        if reference.is_put() {
            if let Some(type_ref) = fieldref.type_ref() {
                defer!(self, self.resolve_and_check_subtype_set(referer, refmethod,
                    &reference.value_types, &ClassOrRef::Ref(type_ref), false, mode,
                    ExceptionKind::LinkageError));
            }
        }

        defer!(self, self.check_member_access(referer, refmethod, &declaring,
            field.field().flag, is_static, &reference.instance_types, mode,
            &format!("field {}", field)));

        if let Some(name) = fieldref.descriptor.element_class_name() {
            self.add_loading_constraint(name, &declaring, referer)?;
        }

        self.report(reference, &field);
        Ok(Some(field))
    }

    pub fn resolve_method(&self, reference: &UnresolvedMethod, mode: ResolveMode)
        -> Result<Option<MethodHandle>, Exception> {
        self.stats.methods.fetch_add(1, Ordering::AcqRel);
        let methodref = &reference.methodref;
        let referer = reference.referer();
        let refmethod = Some(&reference.referer_method);

        let container = defer!(self, self.resolve_classref(&methodref.class, refmethod, mode, true));

        let found = if methodref.is_interface {
            if !container.is_interface() {
                return Err(throw!(IncompatibleClassChange,
                    "Found class {}, but interface was expected", container));
            }
            lookup_interface_method(&container, &methodref.name, &methodref.descriptor,
                                    &self.classes.java_lang_object()?)
        } else {
            if container.is_interface() {
                return Err(throw!(IncompatibleClassChange,
                    "Found interface {}, but class was expected", container));
            }
            lookup_method(&container, &methodref.name, &methodref.descriptor)
        };
        let method = found.ok_or_else(|| throw!(NoSuchMethod, "{}", methodref))?;

        let declaring = method.class.clone();
        let is_static = method.method().is_static();
        if is_static != reference.is_static() {
            return Err(throw!(IncompatibleClassChange, "Expected {} method {}",
                if reference.is_static() { "static" } else { "non-static" }, method));
        }

        if !is_static {
            defer!(self, self.resolve_and_check_subtype_set(referer, refmethod,
                &reference.instance_types, &ClassOrRef::Class(container.clone()), false, mode,
                ExceptionKind::LinkageError));
        }

        if let Some(parameter_types) = &reference.parameter_types {
            for (i, set) in parameter_types.iter().enumerate() {
                if let Some(type_ref) = methodref.parameter_ref(i) {
                    defer!(self, self.resolve_and_check_subtype_set(referer, refmethod, set,
                        &ClassOrRef::Ref(type_ref), false, mode, ExceptionKind::LinkageError));
                }
            }
        }

        defer!(self, self.check_member_access(referer, refmethod, &declaring,
            method.method().flag, is_static, &reference.instance_types, mode,
            &format!("method {}", method)));

        let descriptor = &method.method().descriptor;
        let names = descriptor.parameters.iter().chain(std::iter::once(&descriptor.ret))
            .filter_map(FieldType::element_class_name);
        for name in names {
            self.add_loading_constraint(name, &declaring, referer)?;
        }
        self.add_loading_constraint(&declaring.data.name, &declaring, referer)?;

        let method = if reference.is_special() {
            method
        } else {
            self.devirtualize(method, &reference.instance_types)
        };

        self.report(reference, &method);
        Ok(Some(method))
    }

    /// Picks the implementation an instance of the single known, loaded instance class would run.
    fn devirtualize(&self, method: MethodHandle, instance_types: &SubtypeConstraintSet)
        -> MethodHandle {
        if !method.method().is_virtual() || instance_types.len() != 1 {
            return method;
        }

        let instance = match instance_types.iter().next().and_then(|c| c.loaded(&self.classes)) {
            Some(instance) if !instance.is_interface() && !instance.is_array() => instance,
            _ => return method
        };
        if !instance.is_assignable_to(&method.class) {
            return method;
        }

        let resolved = method.method();
        let target = match resolved.vtable_index {
            Some(index) => instance.vtable_entry(index),
            None => instance.superclasses().find_map(|c| {
                c.find_method(&resolved.name, &resolved.descriptor)
                    .filter(|m| m.method().is_virtual() && !m.method().is_abstract())
            })
        };

        target.unwrap_or(method)
    }

    /// Visibility rules for a member of `declaring` used from `referer`. Protected members of
    /// another package additionally require the referer to be a subclass of the declaring class
    /// and, for instance members, the instance to be a subtype of the referer.
    fn check_member_access(&self, referer: &ClassHandle, refmethod: Option<&MethodHandle>,
                           declaring: &ClassHandle, flag: u16, is_static: bool,
                           instance_types: &SubtypeConstraintSet, mode: ResolveMode,
                           member: &str) -> Result<Option<bool>, Exception> {
        match check_member_access(referer, declaring, flag) {
            MemberAccess::Allowed => Ok(Some(true)),
            MemberAccess::Denied => Err(throw!(IllegalAccess, "class {} cannot access {}",
                referer, member)),
            MemberAccess::RequiresSubclass => {
                let referer_ref = ClassOrRef::Class(referer.clone());

                defer!(self, self.resolve_and_check_subtype_set(referer, refmethod,
                    &SubtypeConstraintSet::single(ClassOrRef::Class(declaring.clone())),
                    &referer_ref, true, mode, ExceptionKind::IllegalAccess));

                if !is_static {
                    defer!(self, self.resolve_and_check_subtype_set(referer, refmethod,
                        instance_types, &referer_ref, false, mode, ExceptionKind::IllegalAccess));
                }

                Ok(Some(true))
            }
        }
    }

    /// `name` has to mean the same class to the loader of `declaring` and of `referer`.
    fn add_loading_constraint(&self, name: &str, declaring: &ClassHandle, referer: &ClassHandle)
        -> Result<(), Exception> {
        let (a, b) = (declaring.data.loader, referer.data.loader);
        if !self.config.loading_constraints || a == b {
            return Ok(());
        }

        self.classes.constraints()
            .add_constraint(name, a, b, |loader| self.classes.find_loaded_class(loader, name))?;

        Ok(())
    }
}

/// Field lookup order: the class itself, its superinterfaces, then its superclass.
pub fn lookup_field(class: &ClassHandle, name: &str, descriptor: &FieldType)
    -> Option<FieldHandle> {
    if let Some(index) = class.find_field(name, descriptor) {
        return Some(FieldHandle { class: class.clone(), index });
    }

    class.data.interfaces.iter()
        .find_map(|i| lookup_field(i, name, descriptor))
        .or_else(|| class.data.superclass.as_ref()
            .and_then(|s| lookup_field(s, name, descriptor)))
}

/// Every superinterface of `class` and its superclasses, breadth first, without duplicates.
fn superinterfaces(class: &ClassHandle) -> Vec<ClassHandle> {
    let mut seen = FxHashSet::default();
    let mut queue: VecDeque<ClassHandle> = class.superclasses()
        .flat_map(|c| c.data.interfaces.iter().cloned())
        .collect();
    let mut result = vec![];

    while let Some(interface) = queue.pop_front() {
        if seen.insert(interface.clone()) {
            queue.extend(interface.data.interfaces.iter().cloned());
            result.push(interface);
        }
    }

    result
}

/// Method lookup in a class: superclass chain first, then superinterfaces.
pub fn lookup_method(class: &ClassHandle, name: &str, descriptor: &MethodDescriptor)
    -> Option<MethodHandle> {
    class.superclasses()
        .find_map(|c| c.find_method(name, descriptor))
        .or_else(|| superinterfaces(class).iter().find_map(|i| {
            i.find_method(name, descriptor)
                .filter(|m| !m.method().is_static() && !m.method().is_private())
        }))
}

/// Method lookup in an interface: the interface, the public instance methods of
/// `java/lang/Object`, then the superinterfaces.
pub fn lookup_interface_method(interface: &ClassHandle, name: &str,
                               descriptor: &MethodDescriptor, object: &ClassHandle)
    -> Option<MethodHandle> {
    interface.find_method(name, descriptor)
        .or_else(|| object.find_method(name, descriptor).filter(|m| {
            let method = m.method();
            !method.is_static() && has_flag(method.flag, AccessFlagMethod::ACC_PUBLIC)
        }))
        .or_else(|| superinterfaces(interface).iter().find_map(|i| {
            i.find_method(name, descriptor)
                .filter(|m| !m.method().is_static() && !m.method().is_private())
        }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::vm::class::access::{AccessFlagClass, AccessFlagField, AccessFlagMethod};
    use crate::vm::class::class::{ClassHandle, LoaderId};
    use crate::vm::class::constant_pool::{ClassRef, FieldRef, MethodRef};
    use crate::vm::class::definition::ClassDefinition;
    use crate::vm::class::field::FieldType;
    use crate::vm::class::method::{MethodDescriptor, MethodHandle};
    use crate::vm::class_loader::bootstrap::ClassArea;
    use crate::vm::class_loader::constraints::LoadingConstraints;
    use crate::vm::class_loader::resolve::{ResolveMode, Resolver, ResolverConfig};
    use crate::vm::exception::ExceptionKind;
    use crate::vm::verify::typeinfo::TypeInfo;
    use crate::vm::verify::unresolved::{create_unresolved_class, create_unresolved_field,
                                        create_unresolved_method, ResolveFlag, UnresolvedField};

    const PUBLIC: u16 = AccessFlagClass::ACC_PUBLIC as u16;
    const M_PUBLIC: u16 = AccessFlagMethod::ACC_PUBLIC as u16;

    struct Fixture {
        area: Arc<ClassArea>,
        resolver: Resolver,
    }

    fn fixture(config: ResolverConfig) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let area = Arc::new(ClassArea::new(Arc::new(LoadingConstraints::new())).unwrap());
        let def = |d: ClassDefinition| area.add_definition(LoaderId::BOOTSTRAP, d.method("run", "()V", M_PUBLIC));

        let f_static = AccessFlagField::ACC_STATIC as u16;
        def(ClassDefinition::new("a/Base", PUBLIC)
            .field("x", "I", 0)
            .field("s", "I", PUBLIC | f_static)
            .field("p", "I", AccessFlagField::ACC_PRIVATE as u16)
            .field("prot", "I", AccessFlagField::ACC_PROTECTED as u16)
            .method("<init>", "()V", M_PUBLIC)
            .method("m", "()V", M_PUBLIC)
            .method("take", "(La/Base;)V", M_PUBLIC)
            .method("helper", "()V", AccessFlagMethod::ACC_PROTECTED as u16)
            .method("stat", "()V", M_PUBLIC | AccessFlagMethod::ACC_STATIC as u16));
        def(ClassDefinition::new("a/Peer", 0));
        def(ClassDefinition::new("b/Sub", PUBLIC).extends("a/Base").method("m", "()V", M_PUBLIC));
        def(ClassDefinition::new("b/Other", PUBLIC).extends("a/Base"));
        def(ClassDefinition::new("b/Stranger", PUBLIC));
        def(ClassDefinition::new("p/I", PUBLIC | AccessFlagClass::ACC_INTERFACE as u16
            | AccessFlagClass::ACC_ABSTRACT as u16)
            .method("m", "()V", M_PUBLIC | AccessFlagMethod::ACC_ABSTRACT as u16));
        def(ClassDefinition::new("p/C", PUBLIC).implements("p/I").method("m", "()V", M_PUBLIC));
        def(ClassDefinition::new("p/Main", PUBLIC));
        def(ClassDefinition::new("p/Lazy", PUBLIC).field("f", "I", PUBLIC));
        def(ClassDefinition::new("p/Late", PUBLIC).extends("a/Base"));

        let resolver = Resolver::new(area.clone(), config);
        Fixture { area, resolver }
    }

    impl Fixture {
        fn class(&self, name: &str) -> ClassHandle {
            self.area.load_class(LoaderId::BOOTSTRAP, name).unwrap()
        }

        fn run(&self, name: &str) -> MethodHandle {
            self.method(&self.class(name), "run")
        }

        fn method(&self, class: &ClassHandle, name: &str) -> MethodHandle {
            let index = class.data.methods.iter().position(|m| m.name == name).unwrap();
            MethodHandle { class: class.clone(), index }
        }

        fn field(&self, from: &str, class: &str, name: &str, descriptor: &str, flags: u8,
                 instance: Option<TypeInfo>) -> UnresolvedField {
            let refmethod = self.run(from);
            let fieldref = FieldRef::new(ClassRef::new(&refmethod.class, class), name,
                                         FieldType::parse(descriptor).unwrap());
            create_unresolved_field(&refmethod, fieldref, flags, instance.as_ref(), None).unwrap()
        }

        fn typed(&self, name: &str) -> Option<TypeInfo> {
            Some(TypeInfo::from_class(&self.class(name)))
        }
    }

    #[test]
    fn lazy_resolution_never_loads() {
        let f = fixture(Default::default());
        let field = f.field("p/Main", "p/Lazy", "f", "I", 0, None);
        let loads = f.area.loads_performed();

        assert_eq!(f.resolver.resolve_field(&field, ResolveMode::Lazy), Ok(None));
        assert_eq!(f.area.loads_performed(), loads);
        assert!(f.resolver.stats().deferred >= 1);

        let resolved = f.resolver.resolve_field(&field, ResolveMode::Eager).unwrap().unwrap();
        assert_eq!(resolved.field().name, "f");
        assert_eq!(f.area.loads_performed(), loads + 1);

        let missing = f.field("p/Main", "p/Missing", "f", "I", 0, None);
        assert_eq!(f.resolver.resolve_field(&missing, ResolveMode::Lazy), Ok(None));
        let err = f.resolver.resolve_field(&missing, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::NoClassDefFound);
    }

    #[test]
    fn eager_configuration_overrides_lazy_requests() {
        let f = fixture(ResolverConfig { eager: true, ..Default::default() });
        let field = f.field("p/Main", "p/Lazy", "f", "I", 0, None);

        assert!(f.resolver.resolve_field(&field, ResolveMode::Lazy).unwrap().is_some());
    }

    #[test]
    fn array_names_resolve_their_component() {
        let f = fixture(Default::default());
        let main = f.class("p/Main");

        let lazy = f.resolver.resolve_class_from_name(&main, None, "[[Lp/Lazy;", ResolveMode::Lazy,
                                                      true);
        assert_eq!(lazy, Ok(None));

        let matrix = f.resolver.resolve_class_from_name(&main, None, "[[Lp/Lazy;",
                                                        ResolveMode::Eager, true).unwrap().unwrap();
        assert_eq!(matrix.data.array.as_ref().unwrap().dimension, 2);

        let ints = f.resolver.resolve_class_from_name(&main, None, "[I", ResolveMode::Lazy, true);
        assert_eq!(ints.unwrap().unwrap().data.name, "[I");

        let refmethod = f.run("p/Main");
        let hidden = create_unresolved_class(&refmethod, ClassRef::new(&main, "[La/Peer;"), None);
        let err = f.resolver.resolve_class(&hidden, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::IllegalAccess);
    }

    #[test]
    fn static_flag_must_match() {
        let f = fixture(Default::default());

        let instance_access = f.field("a/Peer", "a/Base", "s", "I", 0, f.typed("a/Base"));
        let err = f.resolver.resolve_field(&instance_access, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::IncompatibleClassChange);

        let static_access = f.field("a/Peer", "a/Base", "x", "I", ResolveFlag::Static.into(), None);
        let err = f.resolver.resolve_field(&static_access, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::IncompatibleClassChange);

        let ok = f.field("a/Peer", "a/Base", "s", "I", ResolveFlag::Static.into(), None);
        assert!(f.resolver.resolve_field(&ok, ResolveMode::Eager).unwrap().is_some());
    }

    #[test]
    fn missing_members() {
        let f = fixture(Default::default());

        let wrong_type = f.field("a/Peer", "a/Base", "x", "J", 0, None);
        let err = f.resolver.resolve_field(&wrong_type, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::NoSuchField);

        let refmethod = f.run("p/Main");
        let methodref = MethodRef::new(ClassRef::new(&refmethod.class, "a/Base"), "nope",
                                       MethodDescriptor::parse("()V").unwrap());
        let method = create_unresolved_method(&refmethod, methodref, 0, None, &[]).unwrap();
        let err = f.resolver.resolve_method(&method, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::NoSuchMethod);
    }

    #[test]
    fn inherited_fields_are_found() {
        let f = fixture(Default::default());

        let field = f.field("b/Sub", "b/Sub", "s", "I", ResolveFlag::Static.into(), None);
        let resolved = f.resolver.resolve_field(&field, ResolveMode::Eager).unwrap().unwrap();
        assert_eq!(resolved.class, f.class("a/Base"));
    }

    #[test]
    fn private_members_need_the_declaring_class() {
        let f = fixture(Default::default());

        let from_peer = f.field("a/Peer", "a/Base", "p", "I", 0, f.typed("a/Base"));
        let err = f.resolver.resolve_field(&from_peer, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::IllegalAccess);

        let from_self = f.field("a/Base", "a/Base", "p", "I", 0, f.typed("a/Base"));
        assert!(f.resolver.resolve_field(&from_self, ResolveMode::Eager).unwrap().is_some());

        let package = f.field("b/Sub", "a/Base", "x", "I", 0, f.typed("b/Sub"));
        let err = f.resolver.resolve_field(&package, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::IllegalAccess);
    }

    #[test]
    fn protected_members() {
        let f = fixture(Default::default());
        let resolve = |from, instance| {
            let field = f.field(from, "a/Base", "prot", "I", 0, f.typed(instance));
            f.resolver.resolve_field(&field, ResolveMode::Eager).map(|r| r.is_some())
                .map_err(|e| e.kind)
        };

        assert_eq!(resolve("a/Peer", "a/Base"), Ok(true));
        assert_eq!(resolve("b/Sub", "b/Sub"), Ok(true));
        assert_eq!(resolve("b/Sub", "b/Other"), Err(ExceptionKind::IllegalAccess));
        assert_eq!(resolve("b/Stranger", "a/Base"), Err(ExceptionKind::IllegalAccess));

        let refmethod = f.run("b/Sub");
        let methodref = MethodRef::new(ClassRef::new(&refmethod.class, "a/Base"), "helper",
                                       MethodDescriptor::parse("()V").unwrap());
        let helper = create_unresolved_method(&refmethod, methodref, 0, f.typed("b/Sub").as_ref(),
                                              &[]).unwrap();
        assert!(f.resolver.resolve_method(&helper, ResolveMode::Eager).unwrap().is_some());
    }

    #[test]
    fn instance_type_must_match_declaring_class() {
        let f = fixture(Default::default());

        let field = f.field("a/Peer", "a/Base", "x", "I", 0, f.typed("b/Stranger"));
        let err = f.resolver.resolve_field(&field, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::LinkageError);

        let refmethod = f.run("a/Peer");
        let late = TypeInfo::from_class_ref(&ClassRef::new(&refmethod.class, "p/Late"));
        let field = f.field("a/Peer", "a/Base", "x", "I", 0, Some(late));
        assert_eq!(f.resolver.resolve_field(&field, ResolveMode::Lazy), Ok(None));
        assert!(f.resolver.resolve_field(&field, ResolveMode::Eager).unwrap().is_some());
    }

    #[test]
    fn parameter_types_are_checked() {
        let f = fixture(Default::default());
        let refmethod = f.run("p/Main");
        let methodref = MethodRef::new(ClassRef::new(&refmethod.class, "a/Base"), "take",
                                       MethodDescriptor::parse("(La/Base;)V").unwrap());
        let instance = f.typed("a/Base");

        let bad = create_unresolved_method(&refmethod, methodref.clone(), 0, instance.as_ref(),
            &[f.typed("java/lang/String").unwrap()]).unwrap();
        let err = f.resolver.resolve_method(&bad, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::LinkageError);

        let good = create_unresolved_method(&refmethod, methodref, 0, instance.as_ref(),
            &[f.typed("b/Sub").unwrap()]).unwrap();
        assert!(f.resolver.resolve_method(&good, ResolveMode::Eager).unwrap().is_some());
    }

    #[test]
    fn interface_method_resolves_to_implementation() {
        let f = fixture(Default::default());
        let refmethod = f.run("p/Main");
        let methodref = MethodRef::interface(ClassRef::new(&refmethod.class, "p/I"), "m",
                                             MethodDescriptor::parse("()V").unwrap());
        let method = create_unresolved_method(&refmethod, methodref, 0,
                                              f.typed("p/C").as_ref(), &[]).unwrap();

        let resolved = f.resolver.resolve_method(&method, ResolveMode::Eager).unwrap().unwrap();
        assert_eq!(resolved.class, f.class("p/C"));
        assert_eq!(resolved.method().name, "m");
    }

    #[test]
    fn virtual_method_resolves_to_override() {
        let f = fixture(Default::default());
        let refmethod = f.run("p/Main");
        let methodref = MethodRef::new(ClassRef::new(&refmethod.class, "a/Base"), "m",
                                       MethodDescriptor::parse("()V").unwrap());

        let on_sub = create_unresolved_method(&refmethod, methodref.clone(), 0,
                                              f.typed("b/Sub").as_ref(), &[]).unwrap();
        let resolved = f.resolver.resolve_method(&on_sub, ResolveMode::Eager).unwrap().unwrap();
        assert_eq!(resolved.class, f.class("b/Sub"));

        let on_other = create_unresolved_method(&refmethod, methodref, 0,
                                                f.typed("b/Other").as_ref(), &[]).unwrap();
        let resolved = f.resolver.resolve_method(&on_other, ResolveMode::Eager).unwrap().unwrap();
        assert_eq!(resolved.class, f.class("a/Base"));
    }

    #[test]
    fn super_calls_keep_the_resolved_method() {
        let f = fixture(Default::default());
        let refmethod = f.run("b/Sub");
        let methodref = MethodRef::new(ClassRef::new(&refmethod.class, "a/Base"), "m",
                                       MethodDescriptor::parse("()V").unwrap());
        let this = f.typed("b/Sub");

        let call = create_unresolved_method(&refmethod, methodref.clone(),
                                            ResolveFlag::Special.into(), this.as_ref(), &[])
            .unwrap();
        let resolved = f.resolver.resolve_method(&call, ResolveMode::Eager).unwrap().unwrap();
        assert_eq!(resolved.class, f.class("a/Base"));
        assert_eq!(f.resolver.resolve_method(&call, ResolveMode::Lazy).unwrap().unwrap().class,
                   f.class("a/Base"));

        // the same site dispatched virtually runs the override
        let call = create_unresolved_method(&refmethod, methodref, 0, this.as_ref(), &[]).unwrap();
        let resolved = f.resolver.resolve_method(&call, ResolveMode::Eager).unwrap().unwrap();
        assert_eq!(resolved.class, f.class("b/Sub"));
    }

    #[test]
    fn interface_and_class_refs_must_match() {
        let f = fixture(Default::default());
        let refmethod = f.run("p/Main");
        let void = MethodDescriptor::parse("()V").unwrap();

        let as_class = MethodRef::new(ClassRef::new(&refmethod.class, "p/I"), "m", void.clone());
        let method = create_unresolved_method(&refmethod, as_class, 0, None, &[]).unwrap();
        let err = f.resolver.resolve_method(&method, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::IncompatibleClassChange);

        let as_interface = MethodRef::interface(ClassRef::new(&refmethod.class, "p/C"), "m", void);
        let method = create_unresolved_method(&refmethod, as_interface, 0, None, &[]).unwrap();
        let err = f.resolver.resolve_method(&method, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::IncompatibleClassChange);
    }

    #[test]
    fn static_methods() {
        let f = fixture(Default::default());
        let refmethod = f.run("p/Main");
        let methodref = MethodRef::new(ClassRef::new(&refmethod.class, "a/Base"), "stat",
                                       MethodDescriptor::parse("()V").unwrap());

        let method = create_unresolved_method(&refmethod, methodref.clone(),
                                              ResolveFlag::Static.into(), None, &[]).unwrap();
        let resolved = f.resolver.resolve_method(&method, ResolveMode::Eager).unwrap().unwrap();
        assert!(resolved.method().is_static());

        let method = create_unresolved_method(&refmethod, methodref, 0, None, &[]).unwrap();
        let err = f.resolver.resolve_method(&method, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::IncompatibleClassChange);
    }

    #[test]
    fn loading_constraints_between_loaders() {
        let f = fixture(Default::default());
        let library = f.area.add_loader(None);
        let application = f.area.add_child_first_loader(Some(library));
        let constraints = f.area.constraints().clone();

        f.area.add_definition(library, ClassDefinition::new("lib/T", PUBLIC));
        f.area.add_definition(library, ClassDefinition::new("lib/Holder", PUBLIC)
            .field("t", "Llib/T;", PUBLIC));
        f.area.add_definition(application, ClassDefinition::new("lib/T", PUBLIC));
        f.area.add_definition(application, ClassDefinition::new("app/User", PUBLIC)
            .method("run", "()V", M_PUBLIC));

        let user = f.area.load_class(application, "app/User").unwrap();
        let refmethod = f.method(&user, "run");
        let fieldref = FieldRef::new(ClassRef::new(&user, "lib/Holder"), "t",
                                     FieldType::L("lib/T".to_string()));
        let field = create_unresolved_field(&refmethod, fieldref, 0, None, None).unwrap();

        let resolved = f.resolver.resolve_field(&field, ResolveMode::Eager).unwrap().unwrap();
        assert_eq!(resolved.class.data.loader, library);
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints.constrained_loaders("lib/T", application).len(), 2);

        // registering the same constraint again changes nothing
        f.resolver.resolve_field(&field, ResolveMode::Eager).unwrap();
        assert_eq!(constraints.len(), 1);

        let own = f.area.load_class(application, "lib/T").unwrap();
        assert_eq!(own.data.loader, application);
        let err = f.area.load_class(library, "lib/T").unwrap_err();
        assert_eq!(err.kind, ExceptionKind::LinkageError);
    }

    #[test]
    fn conflicting_loaded_classes_fail_resolution() {
        let f = fixture(Default::default());
        let library = f.area.add_loader(None);
        let application = f.area.add_child_first_loader(Some(library));

        f.area.add_definition(library, ClassDefinition::new("lib/T", PUBLIC));
        f.area.add_definition(library, ClassDefinition::new("lib/Api", PUBLIC)
            .method("make", "()Llib/T;", M_PUBLIC | AccessFlagMethod::ACC_STATIC as u16));
        f.area.add_definition(application, ClassDefinition::new("lib/T", PUBLIC));
        f.area.add_definition(application, ClassDefinition::new("app/User", PUBLIC)
            .method("run", "()V", M_PUBLIC));

        f.area.load_class(library, "lib/T").unwrap();
        f.area.load_class(application, "lib/T").unwrap();
        let user = f.area.load_class(application, "app/User").unwrap();
        let refmethod = f.method(&user, "run");
        let methodref = MethodRef::new(ClassRef::new(&user, "lib/Api"), "make",
                                       MethodDescriptor::parse("()Llib/T;").unwrap());
        let method = create_unresolved_method(&refmethod, methodref, ResolveFlag::Static.into(),
                                              None, &[]).unwrap();

        let err = f.resolver.resolve_method(&method, ResolveMode::Eager).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::LinkageError);

        let unchecked = Resolver::new(f.area.clone(), ResolverConfig {
            loading_constraints: false, ..Default::default()
        });
        assert!(unchecked.resolve_method(&method, ResolveMode::Eager).unwrap().is_some());
    }
}
