#![allow(non_camel_case_types)]

use num_enum::IntoPrimitive;

#[derive(IntoPrimitive, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum AccessFlagClass {
    ACC_PUBLIC = 0x0001,
    ACC_FINAL = 0x0010,
    ACC_SUPER = 0x0020,
    ACC_INTERFACE = 0x0200,
    ACC_ABSTRACT = 0x0400,
    ACC_SYNTHETIC = 0x1000,
    ACC_ANNOTATION = 0x2000,
    ACC_ENUM = 0x4000,
}

#[derive(IntoPrimitive, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum AccessFlagField {
    ACC_PUBLIC = 0x0001,
    ACC_PRIVATE = 0x0002,
    ACC_PROTECTED = 0x0004,
    ACC_STATIC = 0x0008,
    ACC_FINAL = 0x0010,
    ACC_VOLATILE = 0x0040,
    ACC_TRANSIENT = 0x0080,
    ACC_SYNTHETIC = 0x1000,
    ACC_ENUM = 0x4000,
}

#[derive(IntoPrimitive, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum AccessFlagMethod {
    ACC_PUBLIC = 0x0001,
    ACC_PRIVATE = 0x0002,
    ACC_PROTECTED = 0x0004,
    ACC_STATIC = 0x0008,
    ACC_FINAL = 0x0010,
    ACC_SYNCHRONIZED = 0x0020,
    ACC_BRIDGE = 0x0040,
    ACC_VARARGS = 0x0080,
    ACC_NATIVE = 0x0100,
    ACC_ABSTRACT = 0x0400,
    ACC_STRICT = 0x0800,
    ACC_SYNTHETIC = 0x1000,
}

/// Visibility of a class member, decoded from the low access bits shared by fields and methods.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Package,
    Private,
}

impl Visibility {
    pub fn from_flags(flags: u16) -> Visibility {
        if flags & 0x0001 != 0 {
            Visibility::Public
        } else if flags & 0x0002 != 0 {
            Visibility::Private
        } else if flags & 0x0004 != 0 {
            Visibility::Protected
        } else {
            Visibility::Package
        }
    }
}
