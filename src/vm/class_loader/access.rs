use crate::vm::class::access::Visibility;
use crate::vm::class::class::ClassHandle;

/// Outcome of the static part of a member access check.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MemberAccess {
    Allowed,
    Denied,
    /// Protected member from another package: only legal if the referer is a subclass of the
    /// declaring class, which the resolver checks through a reversed subtype constraint.
    RequiresSubclass,
}

/// Whether code in `referer` may name `class` at all. Arrays take the accessibility of their
/// element class.
pub fn is_accessible_class(referer: &ClassHandle, class: &ClassHandle) -> bool {
    if let Some(array) = &class.data.array {
        return match &array.element_class {
            Some(element) => is_accessible_class(referer, element),
            None => true
        };
    }

    class.is_public() || referer.same_package(class)
}

pub fn check_member_access(referer: &ClassHandle, declaring: &ClassHandle, flag: u16)
    -> MemberAccess {
    let allowed = |b| if b { MemberAccess::Allowed } else { MemberAccess::Denied };

    match Visibility::from_flags(flag) {
        Visibility::Public => MemberAccess::Allowed,
        Visibility::Private => allowed(referer == declaring),
        Visibility::Package => allowed(referer.same_package(declaring)),
        Visibility::Protected if referer.same_package(declaring) => MemberAccess::Allowed,
        Visibility::Protected => MemberAccess::RequiresSubclass,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::vm::class::access::{AccessFlagClass, AccessFlagField};
    use crate::vm::class::class::LoaderId;
    use crate::vm::class::definition::ClassDefinition;
    use crate::vm::class_loader::access::{check_member_access, is_accessible_class, MemberAccess};
    use crate::vm::class_loader::bootstrap::ClassArea;
    use crate::vm::class_loader::constraints::LoadingConstraints;

    const PUBLIC: u16 = AccessFlagClass::ACC_PUBLIC as u16;

    #[test]
    fn member_visibility() {
        let area = ClassArea::new(Arc::new(LoadingConstraints::new())).unwrap();
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("a/C", PUBLIC));
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("a/Peer", 0));
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("b/Sub", PUBLIC).extends("a/C"));
        area.add_definition(LoaderId::BOOTSTRAP, ClassDefinition::new("b/Other", PUBLIC));
        let load = |n| area.load_class(LoaderId::BOOTSTRAP, n).unwrap();
        let (c, peer, sub, other) = (load("a/C"), load("a/Peer"), load("b/Sub"), load("b/Other"));

        let private = AccessFlagField::ACC_PRIVATE as u16;
        let protected = AccessFlagField::ACC_PROTECTED as u16;

        assert_eq!(check_member_access(&c, &c, private), MemberAccess::Allowed);
        assert_eq!(check_member_access(&peer, &c, private), MemberAccess::Denied);
        assert_eq!(check_member_access(&peer, &c, 0), MemberAccess::Allowed);
        assert_eq!(check_member_access(&sub, &c, 0), MemberAccess::Denied);
        assert_eq!(check_member_access(&peer, &c, protected), MemberAccess::Allowed);
        assert_eq!(check_member_access(&sub, &c, protected), MemberAccess::RequiresSubclass);
        assert_eq!(check_member_access(&other, &c, protected), MemberAccess::RequiresSubclass);
        assert!(sub.is_subclass_of(&c) && !other.is_subclass_of(&c));

        assert!(is_accessible_class(&other, &c));
        assert!(!is_accessible_class(&other, &peer));
        let peers = area.array_of(&peer).unwrap();
        assert!(is_accessible_class(&c, &peers));
        assert!(!is_accessible_class(&other, &peers));
    }
}
