use crate::vm::class::field::FieldType;
use crate::vm::class::method::MethodDescriptor;

impl MethodDescriptor {
    fn parse_field_type(str: &str, is_parameter: bool) -> (Option<FieldType>, &str) {
        let first = match str.chars().next() {
            Some(c) => c,
            None => return (None, str)
        };

        match first {
            'B' => (Some(FieldType::B), &str[1..]),
            'C' => (Some(FieldType::C), &str[1..]),
            'D' => (Some(FieldType::D), &str[1..]),
            'F' => (Some(FieldType::F), &str[1..]),
            'I' => (Some(FieldType::I), &str[1..]),
            'J' => (Some(FieldType::J), &str[1..]),
            'S' => (Some(FieldType::S), &str[1..]),
            'Z' => (Some(FieldType::Z), &str[1..]),
            'L' => {
                match str[1..].find(|c: char| c == ';' || c == ')' || c == '(') {
                    Some(end) if &str[end + 1..end + 2] == ";" && end > 0 =>
                        (Some(FieldType::L(str[1..end + 1].to_string())), &str[end + 2..]),
                    _ => (None, str)
                }
            },
            '[' => {
                match Self::parse_field_type(&str[1..], true) {
                    (Some(component), rest) => (Some(FieldType::A(Box::new(component))), rest),
                    _ => (None, str)
                }
            },
            'V' => if is_parameter {
                (None, str)
            } else {
                (Some(FieldType::V), &str[1..])
            }
            _ => (None, str)
        }
    }

    pub fn parse(mut str: &str) -> Option<Self> {
        str = str.strip_prefix('(')?;

        let mut parameters = vec![];
        loop {
            match Self::parse_field_type(str, true) {
                (Some(arg), rest) => {
                    parameters.push(arg);
                    str = rest;
                }
                _ => break
            }
        }

        str = str.strip_prefix(')')?;

        match Self::parse_field_type(str, false) {
            (Some(ret), rest) if rest.is_empty() => Some(MethodDescriptor {
                parameters,
                ret,
            }),
            _ => None
        }
    }
}

impl FieldType {
    pub fn parse(str: &str) -> Option<Self> {
        match MethodDescriptor::parse_field_type(str, true) {
            (Some(field_type), rest) if rest.is_empty() => Some(field_type),
            _ => None
        }
    }

    /// Interprets a class name as it appears in a `CONSTANT_Class` entry: array classes use their
    /// descriptor, everything else the plain internal name.
    pub fn from_class_name(name: &str) -> Option<Self> {
        if name.starts_with('[') {
            FieldType::parse(name)
        } else if name.is_empty() || name.contains(';') {
            None
        } else {
            Some(FieldType::L(name.to_string()))
        }
    }
}
