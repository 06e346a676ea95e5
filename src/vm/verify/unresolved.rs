use std::fmt::{Display, Formatter};
use num_enum::IntoPrimitive;
use crate::helper::has_flag;
use crate::throw;
use crate::vm::class::class::ClassHandle;
use crate::vm::class::constant_pool::{ClassRef, FieldRef, MethodRef};
use crate::vm::class::method::MethodHandle;
use crate::vm::exception::Exception;
use crate::vm::verify::subtype_set::SubtypeConstraintSet;
use crate::vm::verify::typeinfo::TypeInfo;

#[derive(IntoPrimitive, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ResolveFlag {
    Static = 0x01,
    PutField = 0x02,
    /// invokespecial: the resolved method is called as is, never through the instance's class
    Special = 0x04,
}

#[derive(Debug, Clone)]
pub struct UnresolvedClass {
    pub classref: ClassRef,
    pub referer_method: MethodHandle,
    pub subtype_constraints: SubtypeConstraintSet,
}

#[derive(Debug, Clone)]
pub struct UnresolvedField {
    pub fieldref: FieldRef,
    pub referer_method: MethodHandle,
    pub flags: u8,
    pub instance_types: SubtypeConstraintSet,
    pub value_types: SubtypeConstraintSet,
}

#[derive(Debug, Clone)]
pub struct UnresolvedMethod {
    pub methodref: MethodRef,
    pub referer_method: MethodHandle,
    pub flags: u8,
    pub instance_types: SubtypeConstraintSet,
    /// One set per descriptor parameter, `None` when nothing is known about the arguments
    pub parameter_types: Option<Vec<SubtypeConstraintSet>>,
}

impl UnresolvedClass {
    pub fn referer(&self) -> &ClassHandle {
        &self.classref.referer
    }
}

impl UnresolvedField {
    pub fn referer(&self) -> &ClassHandle {
        &self.fieldref.class.referer
    }

    pub fn is_static(&self) -> bool {
        has_flag(self.flags, ResolveFlag::Static)
    }

    pub fn is_put(&self) -> bool {
        has_flag(self.flags, ResolveFlag::PutField)
    }
}

impl UnresolvedMethod {
    pub fn referer(&self) -> &ClassHandle {
        &self.methodref.class.referer
    }

    pub fn is_static(&self) -> bool {
        has_flag(self.flags, ResolveFlag::Static)
    }

    pub fn is_special(&self) -> bool {
        has_flag(self.flags, ResolveFlag::Special)
    }
}

/// `value` is the verifier's type for the value the class is checked against, if any.
pub fn create_unresolved_class(refmethod: &MethodHandle, classref: ClassRef,
                               value: Option<&TypeInfo>) -> UnresolvedClass {
    let subtype_constraints = value
        .map(|v| SubtypeConstraintSet::from_typeinfo(v, &classref.name))
        .unwrap_or_default();

    UnresolvedClass { classref, referer_method: refmethod.clone(), subtype_constraints }
}

/// Instance type of a field access or invocation on `instance`. Uninitialized objects are only
/// accepted where `uninitialized_ok` says so; they stand for the class under construction.
fn instance_constraints(refmethod: &MethodHandle, declared: &str, instance: Option<&TypeInfo>,
                        uninitialized_ok: bool) -> Result<SubtypeConstraintSet, Exception> {
    match instance {
        None | Some(TypeInfo::Null) => Ok(SubtypeConstraintSet::none()),
        Some(value @ TypeInfo::Reference(_)) => Ok(SubtypeConstraintSet::from_typeinfo(value, declared)),
        Some(TypeInfo::UninitializedNew(_)) if uninitialized_ok => {
            let this = TypeInfo::from_class(&refmethod.class);
            Ok(SubtypeConstraintSet::from_typeinfo(&this, declared))
        }
        Some(TypeInfo::UninitializedNew(_)) => Err(throw!(VerifyError,
            "{}: accessing member of uninitialized object", refmethod)),
        Some(other) => Err(throw!(VerifyError, "{}: expected object reference, found {}",
            refmethod, other)),
    }
}

pub fn create_unresolved_field(refmethod: &MethodHandle, fieldref: FieldRef, flags: u8,
                               instance: Option<&TypeInfo>, value: Option<&TypeInfo>)
    -> Result<UnresolvedField, Exception> {
    let is_static = has_flag(flags, ResolveFlag::Static);
    let is_put = has_flag(flags, ResolveFlag::PutField);

    let instance_types = if is_static {
        SubtypeConstraintSet::none()
    } else {
        // putfield on the uninitialized `this` is how constructors store their fields
        let in_constructor = is_put && refmethod.method().name == "<init>";
        instance_constraints(refmethod, &fieldref.class.name, instance, in_constructor)?
    };

    let value_types = match (is_put, fieldref.descriptor.class_name(), value) {
        (true, Some(declared), Some(value)) => match value {
            TypeInfo::Reference(_) | TypeInfo::Null =>
                SubtypeConstraintSet::from_typeinfo(value, &declared),
            other => return Err(throw!(VerifyError, "{}: cannot store {} into field {}",
                refmethod, other, fieldref))
        },
        _ => SubtypeConstraintSet::none()
    };

    Ok(UnresolvedField {
        fieldref,
        referer_method: refmethod.clone(),
        flags,
        instance_types,
        value_types
    })
}

/// `arguments` are the verifier's types of the explicit arguments, empty if unknown.
pub fn create_unresolved_method(refmethod: &MethodHandle, methodref: MethodRef, flags: u8,
                                instance: Option<&TypeInfo>, arguments: &[TypeInfo])
    -> Result<UnresolvedMethod, Exception> {
    let is_static = has_flag(flags, ResolveFlag::Static);
    if is_static && has_flag(flags, ResolveFlag::Special) {
        return Err(throw!(VerifyError, "{}: {} cannot be both static and special", refmethod,
            methodref));
    }

    let instance_types = if is_static {
        SubtypeConstraintSet::none()
    } else {
        let is_constructor = methodref.name == "<init>";
        let set = instance_constraints(refmethod, &methodref.class.name, instance, is_constructor)?;
        if is_constructor && matches!(instance, Some(TypeInfo::UninitializedNew(_))) {
            SubtypeConstraintSet::none()
        } else {
            set
        }
    };

    let parameter_types = if arguments.is_empty() {
        None
    } else if arguments.len() != methodref.descriptor.parameters.len() {
        return Err(throw!(VerifyError, "{}: {} arguments passed to {}", refmethod,
            arguments.len(), methodref));
    } else {
        let sets = methodref.descriptor.parameters.iter().zip(arguments)
            .map(|(parameter, argument)| match parameter.class_name() {
                Some(declared) => SubtypeConstraintSet::from_typeinfo(argument, &declared),
                None => SubtypeConstraintSet::none()
            })
            .collect::<Vec<_>>();

        sets.iter().any(|s| !s.is_empty()).then(|| sets)
    };

    Ok(UnresolvedMethod {
        methodref,
        referer_method: refmethod.clone(),
        flags,
        instance_types,
        parameter_types
    })
}

impl Display for UnresolvedClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "class {} from {}", self.classref, self.referer_method)
    }
}

impl Display for UnresolvedField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "field {} from {}", self.fieldref, self.referer_method)?;
        if !self.instance_types.is_empty() {
            write!(f, " instance {}", self.instance_types)?;
        }
        if !self.value_types.is_empty() {
            write!(f, " value {}", self.value_types)?;
        }
        Ok(())
    }
}

impl Display for UnresolvedMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "method {} from {}", self.methodref, self.referer_method)?;
        if !self.instance_types.is_empty() {
            write!(f, " instance {}", self.instance_types)?;
        }
        Ok(())
    }
}
