use std::fmt::{Display, Formatter};
use crate::vm::class::class::{ClassHandle, LoaderId};
use crate::vm::class::constant_pool::{ClassOrRef, ClassRef, JAVA_LANG_OBJECT};
use crate::vm::class::field::{FieldType, PrimitiveType};
use crate::vm::class_loader::bootstrap::{ClassArea, JAVA_IO_SERIALIZABLE, JAVA_LANG_CLONEABLE};

/// Basic block a `jsr` returns to
pub type BlockId = usize;
/// Index of the `new` instruction in the method's instruction list
pub type InstructionIndex = usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Assignable {
    Yes,
    No,
    /// Depends on a class that is not loaded yet
    Maybe,
}

impl Assignable {
    pub fn from_bool(b: bool) -> Assignable {
        if b { Assignable::Yes } else { Assignable::No }
    }

    /// Conjunction: any `No` wins, otherwise any `Maybe`.
    pub fn and(self, other: Assignable) -> Assignable {
        match (self, other) {
            (Assignable::No, _) | (_, Assignable::No) => Assignable::No,
            (Assignable::Maybe, _) | (_, Assignable::Maybe) => Assignable::Maybe,
            _ => Assignable::Yes
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeInfo {
    Primitive,
    ReturnAddress(BlockId),
    Null,
    UninitializedNew(InstructionIndex),
    Reference(ReferenceType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceType {
    /// The class itself, or the common supertype when `merged` is present
    pub class_or_ref: ClassOrRef,
    pub dimension: u8,
    pub element_type: Option<PrimitiveType>,
    pub element_class: Option<ClassOrRef>,
    /// Every branch type of a control-flow join. Duplicates are tolerated.
    pub merged: Option<Vec<ClassOrRef>>,
}

fn loader_of(c: &ClassOrRef) -> LoaderId {
    match c {
        ClassOrRef::Class(class) => class.data.loader,
        ClassOrRef::Ref(class_ref) => class_ref.referer.data.loader,
    }
}

/// Whether both denote the same runtime class without loading anything. `false` means unknown.
fn known_same(a: &ClassOrRef, b: &ClassOrRef) -> bool {
    match (a, b) {
        (ClassOrRef::Class(x), ClassOrRef::Class(y)) => x == y,
        _ => a.name() == b.name() && loader_of(a) == loader_of(b)
    }
}

/// Supertypes every array has
fn is_array_supertype(name: &str) -> bool {
    name == JAVA_LANG_OBJECT
        || name == JAVA_LANG_CLONEABLE
        || name == JAVA_IO_SERIALIZABLE
}

impl ReferenceType {
    pub fn of_class(class: &ClassHandle) -> ReferenceType {
        match &class.data.array {
            Some(array) => ReferenceType {
                class_or_ref: class.clone().into(),
                dimension: array.dimension,
                element_type: array.element_type,
                element_class: array.element_class.clone().map(ClassOrRef::Class),
                merged: None
            },
            None => ReferenceType {
                class_or_ref: class.clone().into(),
                dimension: 0,
                element_type: None,
                element_class: None,
                merged: None
            }
        }
    }

    /// Derives dimension and element type from the name; array names are descriptors.
    pub fn of_class_ref(class_ref: &ClassRef) -> ReferenceType {
        let element = class_ref.name.trim_start_matches('[');
        let dimension = (class_ref.name.len() - element.len()).min(u8::MAX as usize) as u8;

        let (element_type, element_class) = if dimension == 0 {
            (None, None)
        } else if let Some(name) = element.strip_prefix('L').and_then(|e| e.strip_suffix(';')) {
            (None, Some(ClassOrRef::Ref(ClassRef::new(&class_ref.referer, name))))
        } else {
            (element.bytes().next().and_then(|b| PrimitiveType::try_from(b).ok()), None)
        };

        ReferenceType {
            class_or_ref: ClassOrRef::Ref(class_ref.clone()),
            dimension,
            element_type,
            element_class,
            merged: None
        }
    }

    pub fn of(c: &ClassOrRef) -> ReferenceType {
        match c {
            ClassOrRef::Class(class) => ReferenceType::of_class(class),
            ClassOrRef::Ref(class_ref) => ReferenceType::of_class_ref(class_ref),
        }
    }

    pub fn is_array(&self) -> bool {
        self.dimension > 0
    }

    /// The single-class part of the assignability test, ignoring `merged`.
    fn class_assignable_to(&self, dest: &ClassOrRef, classes: &ClassArea) -> Assignable {
        if known_same(&self.class_or_ref, dest) || dest.is_object() {
            return Assignable::Yes;
        }

        if let (Some(value), Some(dest)) = (self.class_or_ref.loaded(classes), dest.loaded(classes)) {
            return Assignable::from_bool(value.is_assignable_to(&dest));
        }

        let dest = ReferenceType::of(dest);
        if !dest.is_array() {
            return if self.is_array() {
                Assignable::from_bool(is_array_supertype(dest.class_or_ref.name()))
            } else {
                Assignable::Maybe
            };
        }

        if !self.is_array() || dest.dimension > self.dimension {
            // a class not loaded yet can still not be an array
            return Assignable::No;
        }

        let dest_element = match (&dest.element_type, &dest.element_class) {
            (Some(p), _) => return Assignable::from_bool(
                self.dimension == dest.dimension && self.element_type == Some(*p)),
            (None, Some(element)) => element,
            (None, None) => return Assignable::Maybe
        };

        if self.dimension > dest.dimension {
            return Assignable::from_bool(is_array_supertype(dest_element.name()));
        }

        match &self.element_class {
            None => Assignable::No,
            Some(element) => ReferenceType::of(element).class_assignable_to(dest_element, classes)
        }
    }

    pub fn is_assignable_to_class(&self, dest: &ClassOrRef, classes: &ClassArea) -> Assignable {
        match &self.merged {
            Some(branches) => branches.iter()
                .map(|b| ReferenceType::of(b).class_assignable_to(dest, classes))
                .fold(Assignable::Yes, Assignable::and),
            None => self.class_assignable_to(dest, classes)
        }
    }

    fn branches(&self) -> Vec<ClassOrRef> {
        match &self.merged {
            Some(branches) => branches.clone(),
            None => vec![self.class_or_ref.clone()]
        }
    }
}

impl TypeInfo {
    pub fn from_class(class: &ClassHandle) -> TypeInfo {
        TypeInfo::Reference(ReferenceType::of_class(class))
    }

    pub fn from_class_ref(class_ref: &ClassRef) -> TypeInfo {
        TypeInfo::Reference(ReferenceType::of_class_ref(class_ref))
    }

    pub fn from_class_or_ref(c: &ClassOrRef) -> TypeInfo {
        TypeInfo::Reference(ReferenceType::of(c))
    }

    /// Type of a value declared with `descriptor` in code of `referer`. `None` for void.
    pub fn from_field_type(referer: &ClassHandle, descriptor: &FieldType) -> Option<TypeInfo> {
        match descriptor {
            FieldType::V => None,
            reference if reference.is_reference() => reference.class_name()
                .map(|name| TypeInfo::from_class_ref(&ClassRef::new(referer, name))),
            _ => Some(TypeInfo::Primitive)
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, TypeInfo::Reference(_))
    }

    pub fn reference(&self) -> Option<&ReferenceType> {
        match self {
            TypeInfo::Reference(r) => Some(r),
            _ => None
        }
    }

    /// Whether a value of this type may be stored where `dest` is expected.
    pub fn is_assignable(&self, dest: &TypeInfo, classes: &ClassArea) -> Assignable {
        match (self, dest) {
            (TypeInfo::Primitive, TypeInfo::Primitive) => Assignable::Yes,
            (TypeInfo::ReturnAddress(_), TypeInfo::ReturnAddress(_)) => Assignable::Yes,
            (TypeInfo::Null, TypeInfo::Null | TypeInfo::Reference(_)) => Assignable::Yes,
            (TypeInfo::UninitializedNew(a), TypeInfo::UninitializedNew(b)) =>
                Assignable::from_bool(a == b),
            (TypeInfo::Reference(value), TypeInfo::Reference(dest)) =>
                value.is_assignable_to_class(&dest.class_or_ref, classes),
            _ => Assignable::No
        }
    }

    /// Like `is_assignable` with a class as destination. Only references and null qualify.
    pub fn is_assignable_to_class(&self, dest: &ClassOrRef, classes: &ClassArea) -> Assignable {
        match self {
            TypeInfo::Null => Assignable::Yes,
            TypeInfo::Reference(value) => value.is_assignable_to_class(dest, classes),
            _ => Assignable::No
        }
    }

    /// Join of two types at a control-flow merge point. `None` if the shapes cannot be merged.
    pub fn merge(&self, other: &TypeInfo, classes: &ClassArea) -> Option<TypeInfo> {
        match (self, other) {
            (TypeInfo::Primitive, TypeInfo::Primitive) => Some(TypeInfo::Primitive),
            (TypeInfo::ReturnAddress(a), TypeInfo::ReturnAddress(b)) if a == b => Some(self.clone()),
            (TypeInfo::UninitializedNew(a), TypeInfo::UninitializedNew(b)) if a == b =>
                Some(self.clone()),
            (TypeInfo::Null, TypeInfo::Null) => Some(TypeInfo::Null),
            (TypeInfo::Null, TypeInfo::Reference(_)) => Some(other.clone()),
            (TypeInfo::Reference(_), TypeInfo::Null) => Some(self.clone()),
            (TypeInfo::Reference(a), TypeInfo::Reference(b)) => {
                if a.merged.is_none() && b.merged.is_none() && known_same(&a.class_or_ref, &b.class_or_ref) {
                    return Some(self.clone());
                }

                let mut branches = a.branches();
                for branch in b.branches() {
                    if !branches.iter().any(|known| known_same(known, &branch)) {
                        branches.push(branch);
                    }
                }
                if branches.len() == 1 {
                    return Some(TypeInfo::from_class_or_ref(&branches[0]));
                }

                let mut common = common_supertype(a, b, classes)?;
                common.merged = Some(branches);
                Some(TypeInfo::Reference(common))
            }
            _ => None
        }
    }
}

fn common_superclass(a: &ClassHandle, b: &ClassHandle) -> Option<ClassHandle> {
    if a.is_interface() || b.is_interface() {
        return None;
    }
    a.superclasses().find(|c| b.is_subclass_of(c)).cloned()
}

/// Most precise single class both sides are assignable to that can be named without loading.
fn common_supertype(a: &ReferenceType, b: &ReferenceType, classes: &ClassArea)
    -> Option<ReferenceType> {
    let object = classes.java_lang_object().ok()?;

    if a.is_array() && b.is_array() {
        let same_shape = a.dimension == b.dimension && a.element_type == b.element_type;
        let elements = a.element_class.as_ref().and_then(|e| e.loaded(classes))
            .zip(b.element_class.as_ref().and_then(|e| e.loaded(classes)));

        if let (true, Some((x, y))) = (same_shape, elements) {
            if let Some(mut common) = common_superclass(&x, &y) {
                for _ in 0..a.dimension {
                    common = classes.array_of(&common).ok()?;
                }
                return Some(ReferenceType::of_class(&common));
            }
        }

        let mut stub = ReferenceType::of_class(&classes.array_stub().ok()?);
        stub.dimension = 0;
        return Some(stub);
    }

    if a.is_array() || b.is_array() {
        return Some(ReferenceType::of_class(&object));
    }

    let common = a.class_or_ref.loaded(classes).zip(b.class_or_ref.loaded(classes))
        .and_then(|(x, y)| common_superclass(&x, &y))
        .unwrap_or(object);

    Some(ReferenceType::of_class(&common))
}

impl Display for TypeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeInfo::Primitive => write!(f, "primitive"),
            TypeInfo::ReturnAddress(block) => write!(f, "returnAddress(B{})", block),
            TypeInfo::Null => write!(f, "null"),
            TypeInfo::UninitializedNew(index) => write!(f, "uninitialized(new@{})", index),
            TypeInfo::Reference(r) => {
                write!(f, "{}", r.class_or_ref)?;
                if let Some(merged) = &r.merged {
                    write!(f, " {{")?;
                    for (i, branch) in merged.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", branch)?;
                    }
                    write!(f, "}}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::vm::class::access::AccessFlagClass;
    use crate::vm::class::class::{ClassHandle, LoaderId};
    use crate::vm::class::constant_pool::{ClassOrRef, ClassRef};
    use crate::vm::class::definition::ClassDefinition;
    use crate::vm::class::field::{FieldType, PrimitiveType};
    use crate::vm::class_loader::bootstrap::ClassArea;
    use crate::vm::class_loader::constraints::LoadingConstraints;
    use crate::vm::verify::typeinfo::{Assignable, TypeInfo};

    const PUBLIC: u16 = AccessFlagClass::ACC_PUBLIC as u16;

    fn setup() -> (ClassArea, ClassHandle) {
        let area = ClassArea::new(Arc::new(LoadingConstraints::new())).unwrap();
        let interface = PUBLIC | AccessFlagClass::ACC_INTERFACE as u16;
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("p/I", interface));
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("p/A", PUBLIC).implements("p/I"));
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("p/B", PUBLIC).extends("p/A"));
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("p/C", PUBLIC).extends("p/A"));
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("p/D", PUBLIC));
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("p/Main", PUBLIC));
        let main = area.load_class(LoaderId::BOOTSTRAP, "p/Main").unwrap();
        (area, main)
    }

    fn class(area: &ClassArea, name: &str) -> TypeInfo {
        TypeInfo::from_class(&area.load_class(LoaderId::BOOTSTRAP, name).unwrap())
    }

    #[test]
    fn null_is_assignable_to_references_only() {
        let (area, main) = setup();
        let references = [class(&area, "java/lang/String"), class(&area, "[I"),
            TypeInfo::from_class_ref(&ClassRef::new(&main, "p/Unloaded")), TypeInfo::Null];
        for dest in &references {
            assert_eq!(TypeInfo::Null.is_assignable(dest, &area), Assignable::Yes, "{}", dest);
        }

        for dest in [TypeInfo::Primitive, TypeInfo::ReturnAddress(3), TypeInfo::UninitializedNew(0)] {
            assert_eq!(TypeInfo::Null.is_assignable(&dest, &area), Assignable::No, "{}", dest);
        }
    }

    #[test]
    fn array_covariance() {
        let (area, _) = setup();
        let strings = class(&area, "[Ljava/lang/String;");
        let objects = class(&area, "[Ljava/lang/Object;");

        assert_eq!(strings.is_assignable(&objects, &area), Assignable::Yes);
        assert_eq!(objects.is_assignable(&strings, &area), Assignable::No);
        assert_eq!(class(&area, "[I").is_assignable(&objects, &area), Assignable::No);
        assert_eq!(class(&area, "[[I").is_assignable(&objects, &area), Assignable::Yes);
        assert_eq!(strings.is_assignable(&class(&area, "java/lang/Cloneable"), &area),
                   Assignable::Yes);
    }

    #[test]
    fn unloaded_classes_are_maybe() {
        let (area, main) = setup();
        let unloaded = TypeInfo::from_class_ref(&ClassRef::new(&main, "p/Unloaded"));
        let unloaded_array = TypeInfo::from_class_ref(&ClassRef::new(&main, "[[Lp/Unloaded;"));

        assert_eq!(unloaded.is_assignable(&class(&area, "p/A"), &area), Assignable::Maybe);
        assert_eq!(unloaded.is_assignable(&class(&area, "java/lang/Object"), &area), Assignable::Yes);
        assert_eq!(unloaded.is_assignable(&unloaded, &area), Assignable::Yes);
        assert_eq!(unloaded.is_assignable(&class(&area, "[I"), &area), Assignable::No);

        assert_eq!(unloaded_array.is_assignable(&class(&area, "[Ljava/lang/Object;"), &area),
                   Assignable::Yes);
        assert_eq!(unloaded_array.is_assignable(&class(&area, "[[Ljava/lang/String;"), &area),
                   Assignable::Maybe);
        assert_eq!(unloaded_array.is_assignable(&class(&area, "[[[Ljava/lang/Object;"), &area),
                   Assignable::No);

        let reference = unloaded_array.reference().unwrap();
        assert_eq!(reference.dimension, 2);
        assert_eq!(reference.element_class.as_ref().map(|e| e.name()), Some("p/Unloaded"));
        let ints = TypeInfo::from_class_ref(&ClassRef::new(&main, "[J"));
        assert_eq!(ints.reference().unwrap().element_type, Some(PrimitiveType::Long));

        assert_eq!(TypeInfo::from_field_type(&main, &FieldType::V), None);
        assert_eq!(TypeInfo::from_field_type(&main, &FieldType::I), Some(TypeInfo::Primitive));
        let field = TypeInfo::from_field_type(&main, &FieldType::parse("[Lp/Unloaded;").unwrap())
            .unwrap();
        assert_eq!(field.reference().unwrap().dimension, 1);
        assert_eq!(field.is_assignable(&class(&area, "p/A"), &area), Assignable::No);
    }

    #[test]
    fn merged_types_need_every_branch() {
        let (area, main) = setup();
        let b = class(&area, "p/B");
        let c = class(&area, "p/C");
        let d = class(&area, "p/D");
        let unloaded = TypeInfo::from_class_ref(&ClassRef::new(&main, "p/Unloaded"));

        let bc = b.merge(&c, &area).unwrap();
        let merged = bc.reference().unwrap();
        assert_eq!(merged.class_or_ref.name(), "p/A");
        assert_eq!(merged.merged.as_ref().unwrap().len(), 2);

        let bd = b.merge(&d, &area).unwrap();
        assert!(bd.reference().unwrap().class_or_ref.is_object());
        let b_unloaded = b.merge(&unloaded, &area).unwrap();

        for dest in ["p/A", "p/I", "p/B", "p/D", "java/lang/Object"] {
            let dest = class(&area, dest);
            for (merged, x, y) in [(&bc, &b, &c), (&bd, &b, &d), (&b_unloaded, &b, &unloaded)] {
                assert_eq!(merged.is_assignable(&dest, &area),
                           x.is_assignable(&dest, &area).and(y.is_assignable(&dest, &area)),
                           "{} -> {}", merged, dest);
            }
        }

        assert_eq!(bc.is_assignable(&class(&area, "p/I"), &area), Assignable::Yes);
        assert_eq!(bd.is_assignable(&class(&area, "p/I"), &area), Assignable::No);
        assert_eq!(b_unloaded.is_assignable(&class(&area, "p/A"), &area), Assignable::Maybe);
    }

    #[test]
    fn merging_shapes() {
        let (area, _) = setup();
        let a = class(&area, "p/A");

        assert_eq!(TypeInfo::Null.merge(&a, &area), Some(a.clone()));
        assert_eq!(a.merge(&a, &area), Some(a.clone()));
        assert_eq!(a.merge(&TypeInfo::Primitive, &area), None);
        assert_eq!(TypeInfo::UninitializedNew(1).merge(&TypeInfo::UninitializedNew(2), &area), None);

        let strings = class(&area, "[Ljava/lang/String;");
        let bs = class(&area, "[Lp/B;");
        let merged = strings.merge(&bs, &area).unwrap();
        assert_eq!(merged.reference().unwrap().class_or_ref.name(), "[Ljava/lang/Object;");

        let ints = class(&area, "[I");
        let stub = strings.merge(&ints, &area).unwrap();
        let stub_ref = stub.reference().unwrap();
        assert_eq!(stub_ref.dimension, 0);
        assert_eq!(stub.is_assignable_to_class(&ClassOrRef::Class(area.java_lang_object().unwrap()),
                                               &area), Assignable::Yes);
        assert_eq!(stub.is_assignable(&class(&area, "[Ljava/lang/Object;"), &area), Assignable::No);
    }
}
