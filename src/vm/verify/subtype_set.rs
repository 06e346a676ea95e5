use std::fmt::{Display, Formatter};
use smallvec::SmallVec;
use crate::vm::class::constant_pool::{ClassOrRef, JAVA_LANG_OBJECT};
use crate::vm::verify::typeinfo::TypeInfo;

/// Classes a resolved type has to be checked against once real classes are known. The verifier
/// proved the relationship symbolically; the resolver re-validates it after loading.
///
/// An empty set means "nothing to check".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtypeConstraintSet(SmallVec<[ClassOrRef; 2]>);

impl SubtypeConstraintSet {
    pub fn none() -> SubtypeConstraintSet {
        Default::default()
    }

    pub fn single(class: ClassOrRef) -> SubtypeConstraintSet {
        let mut set = SmallVec::new();
        set.push(class);
        SubtypeConstraintSet(set)
    }

    /// Constraints implied by storing a value of type `value` where `declared` is expected. Returns
    /// the empty set when the check is trivially satisfied.
    pub fn from_typeinfo(value: &TypeInfo, declared: &str) -> SubtypeConstraintSet {
        let reference = match value {
            TypeInfo::Reference(reference) => reference,
            _ => return SubtypeConstraintSet::none()
        };

        if declared == JAVA_LANG_OBJECT {
            return SubtypeConstraintSet::none();
        }

        match &reference.merged {
            Some(branches) => SubtypeConstraintSet(branches.iter().cloned().collect()),
            // identical names are kept identical across loaders by the loading constraints
            None if reference.class_or_ref.name() == declared => SubtypeConstraintSet::none(),
            None => SubtypeConstraintSet::single(reference.class_or_ref.clone())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassOrRef> {
        self.0.iter()
    }
}

impl FromIterator<ClassOrRef> for SubtypeConstraintSet {
    fn from_iter<T: IntoIterator<Item = ClassOrRef>>(iter: T) -> Self {
        SubtypeConstraintSet(iter.into_iter().collect())
    }
}

impl Display for SubtypeConstraintSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, class) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", class)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::vm::class::class::LoaderId;
    use crate::vm::class::constant_pool::ClassRef;
    use crate::vm::class::definition::ClassDefinition;
    use crate::vm::class_loader::bootstrap::ClassArea;
    use crate::vm::class_loader::constraints::LoadingConstraints;
    use crate::vm::verify::subtype_set::SubtypeConstraintSet;
    use crate::vm::verify::typeinfo::TypeInfo;

    #[test]
    fn trivial_constraints_are_dropped() {
        let area = ClassArea::new(Arc::new(LoadingConstraints::new())).unwrap();
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("p/A", 0));
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("p/B", 0).extends("p/A"));
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("p/C", 0).extends("p/A"));
        let b = TypeInfo::from_class(&area.load_class(LoaderId::BOOTSTRAP, "p/B").unwrap());
        let c = TypeInfo::from_class(&area.load_class(LoaderId::BOOTSTRAP, "p/C").unwrap());
        let x = TypeInfo::from_class_ref(&ClassRef::new(&area.java_lang_object().unwrap(), "p/X"));

        assert!(SubtypeConstraintSet::from_typeinfo(&TypeInfo::Null, "p/A").is_empty());
        assert!(SubtypeConstraintSet::from_typeinfo(&TypeInfo::Primitive, "p/A").is_empty());
        assert!(SubtypeConstraintSet::from_typeinfo(&b, "java/lang/Object").is_empty());
        assert!(SubtypeConstraintSet::from_typeinfo(&x, "p/X").is_empty());

        let single = SubtypeConstraintSet::from_typeinfo(&b, "p/A");
        assert_eq!(single.len(), 1);
        assert_eq!(single.to_string(), "{p/B}");

        let merged = b.merge(&c, &area).unwrap();
        let set = SubtypeConstraintSet::from_typeinfo(&merged, "p/A");
        assert_eq!(set.iter().map(|c| c.name()).collect::<Vec<_>>(), vec!["p/B", "p/C"]);
    }
}
