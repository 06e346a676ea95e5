use std::fmt::{Display, Formatter};
use std::sync::Arc;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use crate::throw;
use crate::vm::class::class::ClassHandle;
use crate::vm::class::field::FieldHandle;
use crate::vm::class::method::MethodHandle;
use crate::vm::class_loader::resolve::{ResolveMode, Resolver};
use crate::vm::exception::Exception;
use crate::vm::jit::patcher::interface_target;
use crate::vm::verify::unresolved::{UnresolvedClass, UnresolvedField, UnresolvedMethod};

/// Opcodes of the IR. Values are the JVM bytecode numbers; `impdep2` doubles as the trap word the
/// code builder installs at sites that still need resolution.
#[allow(non_camel_case_types)]
#[derive(TryFromPrimitive, IntoPrimitive, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    nop = 0,
    aconst_null = 1,
    iconst_m1 = 2,
    iconst_0 = 3,
    iconst_1 = 4,
    bipush = 16,
    sipush = 17,
    ldc = 18,
    iload_0 = 26,
    aload_0 = 42,
    aload_1 = 43,
    istore_1 = 60,
    astore_1 = 76,
    pop = 87,
    dup = 89,
    iadd = 96,
    imul = 104,
    ireturn = 172,
    areturn = 176,
    _return = 177,
    getstatic = 178,
    putstatic = 179,
    getfield = 180,
    putfield = 181,
    invokevirtual = 182,
    invokespecial = 183,
    invokestatic = 184,
    invokeinterface = 185,
    new = 187,
    newarray = 188,
    anewarray = 189,
    arraylength = 190,
    athrow = 191,
    checkcast = 192,
    instanceof = 193,
    multianewarray = 197,
    impdep2 = 255,
}

/// Which constant pool reference an opcode carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OperandKind {
    None,
    Class,
    Field,
    Method,
}

impl Opcode {
    pub const fn operand_kind(self) -> OperandKind {
        use Opcode::*;

        match self {
            getstatic | putstatic | getfield | putfield => OperandKind::Field,
            invokevirtual | invokespecial | invokestatic | invokeinterface => OperandKind::Method,
            ldc | new | anewarray | checkcast | instanceof | multianewarray => OperandKind::Class,
            _ => OperandKind::None
        }
    }

    /// Whether the instruction references a symbolic class, field or method.
    pub const fn needs_resolution(self) -> bool {
        !matches!(self.operand_kind(), OperandKind::None)
    }

    pub const fn is_static_access(self) -> bool {
        matches!(self, Opcode::getstatic | Opcode::putstatic | Opcode::invokestatic)
    }

    pub const fn is_put(self) -> bool {
        matches!(self, Opcode::putstatic | Opcode::putfield)
    }

    /// Instructions whose first execution requires the referenced class to be initialized.
    pub const fn initializes_class(self) -> bool {
        matches!(self, Opcode::getstatic | Opcode::putstatic | Opcode::invokestatic | Opcode::new)
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("{:?}", self).trim_start_matches('_'))
    }
}

/// Either the resolved target or the record the patcher resolves at first execution.
#[derive(Debug, Clone)]
pub enum Resolvable<R, U> {
    Resolved(R),
    Unresolved(Arc<U>),
}

impl<R, U> Resolvable<R, U> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolvable::Resolved(_))
    }
}

#[derive(Debug, Clone)]
pub enum Operand {
    None,
    Class(Resolvable<ClassHandle, UnresolvedClass>),
    Field(Resolvable<FieldHandle, UnresolvedField>),
    Method(Resolvable<MethodHandle, UnresolvedMethod>),
}

impl Operand {
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::Class(_) => OperandKind::Class,
            Operand::Field(_) => OperandKind::Field,
            Operand::Method(_) => OperandKind::Method,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
    /// bipush/sipush value, newarray type code or multianewarray dimensions
    pub immediate: i32,
}

impl Instruction {
    pub fn simple(opcode: Opcode) -> Result<Instruction, Exception> {
        Instruction::with_immediate(opcode, 0)
    }

    pub fn with_immediate(opcode: Opcode, immediate: i32) -> Result<Instruction, Exception> {
        if opcode.needs_resolution() {
            return Err(throw!(VerifyError, "{} requires a constant pool reference", opcode));
        }

        Ok(Instruction { opcode, operand: Operand::None, immediate })
    }

    /// Class operand for new, anewarray, checkcast, instanceof, multianewarray and class
    /// constants. Lazy resolution is tried first; anything it cannot settle is left to a patcher.
    pub fn class(resolver: &Resolver, opcode: Opcode, reference: UnresolvedClass)
        -> Result<Instruction, Exception> {
        expect_kind(opcode, OperandKind::Class)?;
        let dimensions = match opcode {
            Opcode::multianewarray => dimensions_of(&reference.classref.name),
            _ => 0
        };

        let resolved = resolver.resolve_class(&reference, ResolveMode::Lazy);
        let operand = settle(opcode, resolved, reference);

        Ok(Instruction { opcode, operand: Operand::Class(operand), immediate: dimensions })
    }

    pub fn field(resolver: &Resolver, opcode: Opcode, reference: UnresolvedField)
        -> Result<Instruction, Exception> {
        expect_kind(opcode, OperandKind::Field)?;
        if opcode.is_static_access() != reference.is_static() || opcode.is_put() != reference.is_put() {
            return Err(throw!(VerifyError, "{} does not match {}", opcode, reference));
        }

        let resolved = resolver.resolve_field(&reference, ResolveMode::Lazy);
        let operand = settle(opcode, resolved, reference);

        Ok(Instruction { opcode, operand: Operand::Field(operand), immediate: 0 })
    }

    /// For invokeinterface the resolved operand is the interface method, which carries the
    /// interface table index the call site dispatches through. invokespecial requests have to be
    /// flagged `Special` so that they are bound to the resolved method itself.
    pub fn method(resolver: &Resolver, opcode: Opcode, reference: UnresolvedMethod)
        -> Result<Instruction, Exception> {
        expect_kind(opcode, OperandKind::Method)?;
        let interface_ok = match opcode {
            Opcode::invokeinterface => reference.methodref.is_interface,
            Opcode::invokevirtual => !reference.methodref.is_interface,
            _ => true
        };
        let special_ok = (opcode == Opcode::invokespecial) == reference.is_special();
        if opcode.is_static_access() != reference.is_static() || !interface_ok || !special_ok {
            return Err(throw!(VerifyError, "{} does not match {}", opcode, reference));
        }

        let resolved = resolver.resolve_method(&reference, ResolveMode::Lazy)
            .and_then(|method| match (method, opcode) {
                (Some(_), Opcode::invokeinterface) => interface_target(resolver, &reference).map(Some),
                (method, _) => Ok(method)
            });

        let operand = settle(opcode, resolved, reference);

        Ok(Instruction { opcode, operand: Operand::Method(operand), immediate: 0 })
    }

    pub fn is_resolved(&self) -> bool {
        match &self.operand {
            Operand::None => true,
            Operand::Class(c) => c.is_resolved(),
            Operand::Field(f) => f.is_resolved(),
            Operand::Method(m) => m.is_resolved(),
        }
    }
}

/// Errors found while compiling belong to the instruction and are thrown when it first executes,
/// so the site is left to its patcher like a deferred one.
fn settle<R, U: Display>(opcode: Opcode, resolved: Result<Option<R>, Exception>, reference: U)
    -> Resolvable<R, U> {
    match resolved {
        Ok(Some(target)) => Resolvable::Resolved(target),
        Ok(None) => Resolvable::Unresolved(Arc::new(reference)),
        Err(e) => {
            log::debug!("Deferring {} of {} to execution: {}", opcode, reference, e);
            Resolvable::Unresolved(Arc::new(reference))
        }
    }
}

fn expect_kind(opcode: Opcode, kind: OperandKind) -> Result<(), Exception> {
    if opcode.operand_kind() != kind {
        return Err(throw!(VerifyError, "{} does not take a {:?} operand", opcode, kind));
    }

    Ok(())
}

fn dimensions_of(name: &str) -> i32 {
    name.bytes().take_while(|&b| b == b'[').count() as i32
}

#[cfg(test)]
mod tests {
    use crate::vm::jit::instructions::{Instruction, Opcode, OperandKind};

    #[test]
    fn opcode_numbers() {
        assert_eq!(Opcode::try_from(180u8), Ok(Opcode::getfield));
        assert_eq!(u8::from(Opcode::multianewarray), 197);
        assert_eq!(u8::from(Opcode::impdep2), 0xff);
        assert!(Opcode::try_from(186u8).is_err());
        assert_eq!(Opcode::_return.to_string(), "return");
    }

    #[test]
    fn classification() {
        assert_eq!(Opcode::putfield.operand_kind(), OperandKind::Field);
        assert_eq!(Opcode::invokeinterface.operand_kind(), OperandKind::Method);
        assert_eq!(Opcode::checkcast.operand_kind(), OperandKind::Class);
        assert!(Opcode::new.needs_resolution());
        assert!(!Opcode::newarray.needs_resolution());
        assert!(!Opcode::arraylength.needs_resolution());
        assert!(Opcode::new.initializes_class());
        assert!(!Opcode::getfield.initializes_class());

        assert!(Instruction::simple(Opcode::getfield).is_err());
        let push = Instruction::with_immediate(Opcode::bipush, 7).unwrap();
        assert!(push.is_resolved());
        assert_eq!(push.immediate, 7);
    }
}
