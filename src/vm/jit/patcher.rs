use std::cell::Cell;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use parking_lot::ReentrantMutex;
use crate::helper::{address_of, has_flag};
use crate::throw;
use crate::vm::class::access::AccessFlagClass;
use crate::vm::class::class::{ClassHandle, ClassState};
use crate::vm::class::field::FieldHandle;
use crate::vm::class::method::MethodHandle;
use crate::vm::class_loader::init::initialize_class;
use crate::vm::class_loader::resolve::{lookup_interface_method, ResolveMode, Resolver};
use crate::vm::exception::Exception;
use crate::vm::jit::code::{CodeMemory, WORD_SIZE};
use crate::vm::jit::instructions::Opcode;
use crate::vm::verify::unresolved::{UnresolvedClass, UnresolvedField, UnresolvedMethod};

/// Computes the word written into the data slot of a site.
pub type PatcherFn = fn(&Resolver, &PatchOperand) -> Result<u64, Exception>;

/// What a patcher works on.
#[derive(Debug, Clone)]
pub enum PatchOperand {
    Class(Arc<UnresolvedClass>),
    Field(Arc<UnresolvedField>),
    Method(Arc<UnresolvedMethod>),
    /// Resolved while compiling, but the class still has to be initialized before first use
    Initialize { class: ClassHandle, value: u64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PatchState {
    Unpatched,
    Patching,
    Patched,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrapOutcome {
    /// This call resolved the site and rewrote it
    Patched,
    /// Someone else already did
    AlreadyPatched,
    /// The address is not a registered patch site
    NoPatchSite,
}

/// A compiled site that traps until its first execution resolves and rewrites it. A failed patch
/// leaves the trap in place so that the next execution raises the error again.
pub struct PatchReference {
    code_position: u64,
    data_slot: u64,
    displacement: i32,
    patcher: PatcherFn,
    reference: PatchOperand,
    saved_original_code: u64,
    // Reentrant: a class initializer run by the patcher may execute this very site again
    state: ReentrantMutex<Cell<PatchState>>,
}

impl PatchReference {
    pub(super) fn new(code_position: u64, data_slot: u64, displacement: i32, patcher: PatcherFn,
                      reference: PatchOperand, saved_original_code: u64) -> PatchReference {
        PatchReference {
            code_position,
            data_slot,
            displacement,
            patcher,
            reference,
            saved_original_code,
            state: ReentrantMutex::new(Cell::new(PatchState::Unpatched)),
        }
    }

    pub fn code_position(&self) -> u64 {
        self.code_position
    }

    pub fn data_address(&self) -> u64 {
        self.data_slot.wrapping_add(self.displacement as i64 as u64)
    }

    pub fn operand(&self) -> &PatchOperand {
        &self.reference
    }

    pub fn state(&self) -> PatchState {
        self.state.lock().get()
    }

    /// Runs the patch protocol for this site. The lock is held across resolution, so of any number
    /// of racing threads exactly one calls the resolver.
    pub(crate) fn handle_trap(&self, resolver: &Resolver, memory: &CodeMemory)
        -> Result<TrapOutcome, Exception> {
        let state = self.state.lock();
        if state.get() == PatchState::Patched {
            return Ok(TrapOutcome::AlreadyPatched);
        }

        state.set(PatchState::Patching);
        let value = match (self.patcher)(resolver, &self.reference) {
            Ok(value) => value,
            Err(e) => {
                if state.get() != PatchState::Patched {
                    state.set(PatchState::Unpatched);
                }
                log::warn!("Patching {:#x} failed: {}", self.code_position, e);
                return Err(e);
            }
        };

        // A nested trap on this thread got here first
        if state.get() == PatchState::Patched {
            return Ok(TrapOutcome::AlreadyPatched);
        }

        memory.patch_word(self.data_address(), value)?;
        memory.patch_word(self.code_position, self.saved_original_code)?;
        state.set(PatchState::Patched);

        log::debug!("Patched {:#x} with {:#x} ({:?})", self.code_position, value, self.reference);
        Ok(TrapOutcome::Patched)
    }
}

impl Debug for PatchReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchReference")
            .field("code_position", &format_args!("{:#x}", self.code_position))
            .field("data_slot", &format_args!("{:#x}", self.data_slot))
            .field("displacement", &self.displacement)
            .field("reference", &self.reference)
            .field("state", &self.state.try_lock().map(|s| s.get()))
            .finish()
    }
}

/// Patcher for the unresolved operand of `opcode`.
pub fn patcher_for(opcode: Opcode) -> Option<PatcherFn> {
    use Opcode::*;

    let patcher: PatcherFn = match opcode {
        getstatic | putstatic => patch_get_put_static,
        getfield | putfield => patch_get_put_field,
        invokestatic | invokespecial => patch_invoke_direct,
        invokevirtual => patch_invokevirtual,
        invokeinterface => patch_invokeinterface,
        new => patch_new,
        anewarray => patch_anewarray,
        ldc | checkcast | instanceof | multianewarray => patch_class,
        _ => return None
    };

    Some(patcher)
}

fn eager<T>(result: Result<Option<T>, Exception>, what: &dyn std::fmt::Display)
    -> Result<T, Exception> {
    result?.ok_or_else(|| throw!(LinkageError, "Eager resolution of {} was deferred", what))
}

fn wrong_operand(patcher: &str, operand: &PatchOperand) -> Exception {
    throw!(LinkageError, "{} cannot patch {:?}", patcher, operand)
}

fn is_initialized(class: &ClassHandle) -> bool {
    *class.state.lock() == ClassState::Initialized
}

/// Data word of a static field access: the address of its static slot.
pub fn static_field_value(field: &FieldHandle) -> Result<u64, Exception> {
    field.class.data.static_fields.get(field.offset())
        .map(address_of)
        .ok_or_else(|| throw!(LinkageError, "{} has no static storage", field))
}

/// Data word of an instance field access: the byte offset inside the object.
pub fn instance_field_value(field: &FieldHandle) -> u64 {
    field.offset() as u64
}

/// Data word of an invocation. Statically bound calls get the method itself, virtual and
/// interface calls the byte offset of their table entry.
pub fn method_value(opcode: Opcode, method: &MethodHandle) -> u64 {
    let resolved = method.method();
    let table_index = match opcode {
        Opcode::invokeinterface => resolved.itable_index.or(resolved.vtable_index),
        Opcode::invokevirtual => resolved.vtable_index,
        _ => None
    };

    match table_index {
        Some(index) => index as u64 * WORD_SIZE,
        // private and final targets of invokevirtual
        None => address_of(resolved)
    }
}

pub fn class_value(class: &ClassHandle) -> u64 {
    class.ptr() as usize as u64
}

/// The interface-level method an invokeinterface site dispatches through. Resolution may already
/// have narrowed the target to an implementation, which has no interface table index.
pub fn interface_target(resolver: &Resolver, reference: &UnresolvedMethod)
    -> Result<MethodHandle, Exception> {
    let methodref = &reference.methodref;
    let interface = eager(resolver.resolve_classref(&methodref.class,
        Some(&reference.referer_method), ResolveMode::Eager, false), &methodref.class)?;
    let object = resolver.classes().java_lang_object()?;

    lookup_interface_method(&interface, &methodref.name, &methodref.descriptor, &object)
        .ok_or_else(|| throw!(NoSuchMethod, "{}", methodref))
}

fn patch_get_put_static(resolver: &Resolver, operand: &PatchOperand) -> Result<u64, Exception> {
    let reference = match operand {
        PatchOperand::Field(reference) => reference,
        other => return Err(wrong_operand("get/putstatic patcher", other))
    };

    let field = eager(resolver.resolve_field(reference, ResolveMode::Eager), &**reference)?;
    initialize_class(&field.class)?;

    static_field_value(&field)
}

fn patch_get_put_field(resolver: &Resolver, operand: &PatchOperand) -> Result<u64, Exception> {
    let reference = match operand {
        PatchOperand::Field(reference) => reference,
        other => return Err(wrong_operand("get/putfield patcher", other))
    };

    let field = eager(resolver.resolve_field(reference, ResolveMode::Eager), &**reference)?;
    Ok(instance_field_value(&field))
}

fn patch_invoke_direct(resolver: &Resolver, operand: &PatchOperand) -> Result<u64, Exception> {
    let reference = match operand {
        PatchOperand::Method(reference) => reference,
        other => return Err(wrong_operand("invokestatic/invokespecial patcher", other))
    };

    let method = eager(resolver.resolve_method(reference, ResolveMode::Eager), &**reference)?;
    if reference.is_static() {
        initialize_class(&method.class)?;
    }

    Ok(address_of(method.method()))
}

fn patch_invokevirtual(resolver: &Resolver, operand: &PatchOperand) -> Result<u64, Exception> {
    let reference = match operand {
        PatchOperand::Method(reference) => reference,
        other => return Err(wrong_operand("invokevirtual patcher", other))
    };

    let method = eager(resolver.resolve_method(reference, ResolveMode::Eager), &**reference)?;
    Ok(method_value(Opcode::invokevirtual, &method))
}

fn patch_invokeinterface(resolver: &Resolver, operand: &PatchOperand) -> Result<u64, Exception> {
    let reference = match operand {
        PatchOperand::Method(reference) => reference,
        other => return Err(wrong_operand("invokeinterface patcher", other))
    };

    eager(resolver.resolve_method(reference, ResolveMode::Eager), &**reference)?;
    let method = interface_target(resolver, reference)?;

    Ok(method_value(Opcode::invokeinterface, &method))
}

fn patch_new(resolver: &Resolver, operand: &PatchOperand) -> Result<u64, Exception> {
    let reference = match operand {
        PatchOperand::Class(reference) => reference,
        other => return Err(wrong_operand("new patcher", other))
    };

    let class = eager(resolver.resolve_class(reference, ResolveMode::Eager), &**reference)?;
    if class.is_interface() || has_flag(class.data.flag, AccessFlagClass::ACC_ABSTRACT) {
        return Err(throw!(Instantiation, "{}", class));
    }
    initialize_class(&class)?;

    Ok(class_value(&class))
}

fn patch_anewarray(resolver: &Resolver, operand: &PatchOperand) -> Result<u64, Exception> {
    let reference = match operand {
        PatchOperand::Class(reference) => reference,
        other => return Err(wrong_operand("anewarray patcher", other))
    };

    let component = eager(resolver.resolve_class(reference, ResolveMode::Eager), &**reference)?;
    let array = resolver.classes().array_of(&component)?;

    Ok(class_value(&array))
}

fn patch_class(resolver: &Resolver, operand: &PatchOperand) -> Result<u64, Exception> {
    let reference = match operand {
        PatchOperand::Class(reference) => reference,
        other => return Err(wrong_operand("class patcher", other))
    };

    let class = eager(resolver.resolve_class(reference, ResolveMode::Eager), &**reference)?;
    Ok(class_value(&class))
}

/// For sites resolved at compile time whose class was not initialized yet.
pub fn patch_initialize_class(_resolver: &Resolver, operand: &PatchOperand)
    -> Result<u64, Exception> {
    match operand {
        PatchOperand::Initialize { class, value } => {
            initialize_class(class)?;
            Ok(*value)
        }
        other => Err(wrong_operand("class initialization patcher", other))
    }
}

/// Whether a site resolved at compile time still has to initialize `class` at first execution.
pub(super) fn needs_initialization(opcode: Opcode, class: &ClassHandle) -> bool {
    opcode.initializes_class() && !is_initialized(class)
}
