use std::fmt::{Display, Formatter};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use crate::helper::has_flag;
use crate::vm::class::access::AccessFlagField;
use crate::vm::class::class::ClassHandle;

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum FieldType {
    B,
    C,
    D,
    F,
    I,
    J,
    L(String),
    S,
    Z,
    A(Box<FieldType>), // [
    V
}

/// Primitive tag of a value or of an array element. The discriminant is the descriptor character.
#[derive(TryFromPrimitive, IntoPrimitive, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveType {
    Boolean = b'Z',
    Byte = b'B',
    Char = b'C',
    Short = b'S',
    Int = b'I',
    Long = b'J',
    Float = b'F',
    Double = b'D',
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 8] = [PrimitiveType::Boolean, PrimitiveType::Byte,
        PrimitiveType::Char, PrimitiveType::Short, PrimitiveType::Int, PrimitiveType::Long,
        PrimitiveType::Float, PrimitiveType::Double];

    /// Maps the operand of `newarray` to its element type.
    pub fn from_newarray_code(code: u8) -> Option<PrimitiveType> {
        match code {
            4 => Some(PrimitiveType::Boolean),
            5 => Some(PrimitiveType::Char),
            6 => Some(PrimitiveType::Float),
            7 => Some(PrimitiveType::Double),
            8 => Some(PrimitiveType::Byte),
            9 => Some(PrimitiveType::Short),
            10 => Some(PrimitiveType::Int),
            11 => Some(PrimitiveType::Long),
            _ => None
        }
    }

    pub fn descriptor(self) -> char {
        u8::from(self) as char
    }

    pub fn array_class_name(self) -> String {
        format!("[{}", self.descriptor())
    }
}

impl FieldType {
    pub fn primitive(&self) -> Option<PrimitiveType> {
        match self {
            FieldType::B => Some(PrimitiveType::Byte),
            FieldType::C => Some(PrimitiveType::Char),
            FieldType::D => Some(PrimitiveType::Double),
            FieldType::F => Some(PrimitiveType::Float),
            FieldType::I => Some(PrimitiveType::Int),
            FieldType::J => Some(PrimitiveType::Long),
            FieldType::S => Some(PrimitiveType::Short),
            FieldType::Z => Some(PrimitiveType::Boolean),
            _ => None
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::L(_) | FieldType::A(_))
    }

    /// Name under which a class loader would look this type up: the plain internal name for
    /// objects, the descriptor for arrays, `None` for primitives and void.
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::L(name) => Some(name.clone()),
            FieldType::A(_) => Some(self.to_string()),
            _ => None
        }
    }

    /// Innermost element class name, which is what loading constraints are recorded for.
    pub fn element_class_name(&self) -> Option<&str> {
        match self {
            FieldType::L(name) => Some(name),
            FieldType::A(component) => component.element_class_name(),
            _ => None
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::L(name) => write!(f, "L{};", name),
            FieldType::A(component) => write!(f, "[{}", component),
            FieldType::V => write!(f, "V"),
            primitive => match primitive.primitive() {
                Some(p) => write!(f, "{}", p.descriptor()),
                None => unreachable!()
            }
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct Field {
    pub flag: u16,
    pub name: String,
    pub descriptor: FieldType,
    /// Byte offset inside an instance for instance fields, index into the static storage of the
    /// declaring class for static fields. Assigned when the class is linked.
    pub offset: usize,
}

impl Field {
    pub fn is_static(&self) -> bool {
        has_flag(self.flag, AccessFlagField::ACC_STATIC)
    }
}

/// A resolved field: the declaring class plus the index into its field table.
#[derive(Clone, Debug)]
pub struct FieldHandle {
    pub class: ClassHandle,
    pub index: usize,
}

impl FieldHandle {
    pub fn field(&self) -> &Field {
        &self.class.data.fields[self.index]
    }

    pub fn offset(&self) -> usize {
        self.field().offset
    }
}

impl PartialEq for FieldHandle {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class && self.index == other.index
    }
}

impl Eq for FieldHandle {}

impl Display for FieldHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let field = self.field();
        write!(f, "{}.{}:{}", self.class.data.name, field.name, field.descriptor)
    }
}

#[cfg(test)]
mod tests {
    use crate::vm::class::field::{FieldType, PrimitiveType};

    #[test]
    fn newarray_codes() {
        assert_eq!(PrimitiveType::from_newarray_code(10), Some(PrimitiveType::Int));
        assert_eq!(PrimitiveType::from_newarray_code(4).unwrap().array_class_name(), "[Z");
        assert_eq!(PrimitiveType::from_newarray_code(3), None);
        assert_eq!(PrimitiveType::try_from(b'J').ok(), Some(PrimitiveType::Long));
    }

    #[test]
    fn class_names() {
        let string = FieldType::L("java/lang/String".to_string());
        let matrix = FieldType::A(Box::new(FieldType::A(Box::new(string.clone()))));

        assert_eq!(string.class_name().as_deref(), Some("java/lang/String"));
        assert_eq!(matrix.class_name().as_deref(), Some("[[Ljava/lang/String;"));
        assert_eq!(matrix.element_class_name(), Some("java/lang/String"));
        assert_eq!(FieldType::A(Box::new(FieldType::I)).element_class_name(), None);
        assert_eq!(FieldType::I.class_name(), None);
    }
}
