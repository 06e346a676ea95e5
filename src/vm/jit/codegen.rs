use crate::throw;
use crate::vm::class::class::ClassHandle;
use crate::vm::class::method::MethodHandle;
use crate::vm::class_loader::resolve::Resolver;
use crate::vm::exception::Exception;
use crate::vm::jit::code::{CodeMemory, WORD_SIZE};
use crate::vm::jit::instructions::{Instruction, Opcode, Operand, Resolvable};
use crate::vm::jit::patcher::{class_value, instance_field_value, method_value, needs_initialization,
                              patch_initialize_class, patcher_for, static_field_value, PatchOperand,
                              PatchReference, PatcherFn};

/// Code words are `opcode << 56 | displacement`, where the displacement locates the data slot of
/// the instruction relative to the method entry. Instructions without a data slot use 0.
pub fn encode(opcode: Opcode, displacement: i32) -> u64 {
    (u8::from(opcode) as u64) << 56 | displacement as u32 as u64
}

pub fn decode(word: u64) -> Option<(Opcode, i32)> {
    let opcode = Opcode::try_from((word >> 56) as u8).ok()?;
    Some((opcode, word as u32 as i32))
}

pub const TRAP_WORD: u64 = (Opcode::impdep2 as u64) << 56;

pub fn is_trap(word: u64) -> bool {
    word >> 56 == TRAP_WORD >> 56
}

#[derive(Debug, Copy, Clone)]
struct CodeWord {
    opcode: Opcode,
    data: Option<usize>,
}

struct PendingPatch {
    code_index: usize,
    data_index: usize,
    patcher: PatcherFn,
    reference: PatchOperand,
}

/// Lays out a compiled method: the data segment first, then one code word per instruction, the
/// entry point sitting between the two.
pub struct CodeBuilder<'a> {
    resolver: &'a Resolver,
    method: MethodHandle,
    data: Vec<u64>,
    code: Vec<CodeWord>,
    patches: Vec<PendingPatch>,
}

impl<'a> CodeBuilder<'a> {
    pub fn new(resolver: &'a Resolver, method: MethodHandle) -> CodeBuilder<'a> {
        CodeBuilder { resolver, method, data: vec![], code: vec![], patches: vec![] }
    }

    pub fn emit(&mut self, instruction: &Instruction) -> Result<(), Exception> {
        let opcode = instruction.opcode;
        let data = match &instruction.operand {
            Operand::None => match opcode {
                Opcode::bipush | Opcode::sipush | Opcode::newarray =>
                    Some(self.add_data(instruction.immediate as i64 as u64)),
                _ => None
            },
            Operand::Class(Resolvable::Resolved(class)) => {
                let value = match opcode {
                    Opcode::anewarray => class_value(&self.resolver.classes().array_of(class)?),
                    _ => class_value(class)
                };
                Some(self.add_resolved(opcode, class, value))
            }
            Operand::Field(Resolvable::Resolved(field)) => {
                let value = if field.field().is_static() {
                    static_field_value(field)?
                } else {
                    instance_field_value(field)
                };
                Some(self.add_resolved(opcode, &field.class, value))
            }
            Operand::Method(Resolvable::Resolved(method)) =>
                Some(self.add_resolved(opcode, &method.class, method_value(opcode, method))),
            Operand::Class(Resolvable::Unresolved(reference)) =>
                Some(self.add_unresolved(opcode, PatchOperand::Class(reference.clone()))?),
            Operand::Field(Resolvable::Unresolved(reference)) =>
                Some(self.add_unresolved(opcode, PatchOperand::Field(reference.clone()))?),
            Operand::Method(Resolvable::Unresolved(reference)) =>
                Some(self.add_unresolved(opcode, PatchOperand::Method(reference.clone()))?),
        };

        self.code.push(CodeWord { opcode, data });
        Ok(())
    }

    fn add_data(&mut self, value: u64) -> usize {
        self.data.push(value);
        self.data.len() - 1
    }

    fn add_resolved(&mut self, opcode: Opcode, class: &ClassHandle, value: u64) -> usize {
        if !needs_initialization(opcode, class) {
            return self.add_data(value);
        }

        let slot = self.add_data(0);
        self.add_patch_ref(self.code.len(), slot, patch_initialize_class,
                           PatchOperand::Initialize { class: class.clone(), value });
        slot
    }

    fn add_unresolved(&mut self, opcode: Opcode, reference: PatchOperand)
        -> Result<usize, Exception> {
        let patcher = patcher_for(opcode)
            .ok_or_else(|| throw!(VerifyError, "{} has no patcher", opcode))?;

        let slot = self.add_data(0);
        self.add_patch_ref(self.code.len(), slot, patcher, reference);
        Ok(slot)
    }

    /// Registers a lazily bound site. Positions are instruction and data indices; they become
    /// addresses when the method is installed.
    pub fn add_patch_ref(&mut self, code_index: usize, data_index: usize, patcher: PatcherFn,
                         reference: PatchOperand) {
        self.patches.push(PendingPatch { code_index, data_index, patcher, reference });
    }

    fn displacement(&self, data_index: usize) -> i32 {
        -(((self.data.len() - data_index) as u64 * WORD_SIZE) as i32)
    }

    /// Copies data and code into `memory`, with trap words at every site that still needs patching.
    pub fn finish(self, memory: &CodeMemory) -> Result<CompiledMethod, Exception> {
        let words = self.data.len() + self.code.len();
        let start = memory.allocate(words.max(1))?;
        let entry = start + self.data.len() as u64 * WORD_SIZE;

        for (i, value) in self.data.iter().enumerate() {
            memory.write_word(start + i as u64 * WORD_SIZE, *value)?;
        }

        let original: Vec<u64> = self.code.iter()
            .map(|word| encode(word.opcode, word.data.map_or(0, |d| self.displacement(d))))
            .collect();

        let mut words_out = original.clone();
        for patch in &self.patches {
            if let Some(word) = words_out.get_mut(patch.code_index) {
                *word = TRAP_WORD;
            }
        }
        for (i, word) in words_out.iter().enumerate() {
            memory.write_word(entry + i as u64 * WORD_SIZE, *word)?;
        }

        let mut patch_refs = Vec::with_capacity(self.patches.len());
        for patch in self.patches.iter() {
            let saved = *original.get(patch.code_index)
                .ok_or_else(|| throw!(VerifyError, "Patch for missing instruction {}",
                    patch.code_index))?;
            patch_refs.push(PatchReference::new(
                entry + patch.code_index as u64 * WORD_SIZE,
                entry,
                self.displacement(patch.data_index),
                patch.patcher,
                patch.reference.clone(),
                saved));
        }
        patch_refs.sort_by_key(PatchReference::code_position);

        log::debug!("Compiled {} at {:#x}: {} instructions, {} data words, {} patch sites",
            self.method, entry, self.code.len(), self.data.len(), patch_refs.len());

        Ok(CompiledMethod {
            method: self.method,
            start,
            entry,
            end: start + words as u64 * WORD_SIZE,
            patch_refs,
        })
    }
}

/// A method installed in the code area together with the patch references of its lazy sites.
#[derive(Debug)]
pub struct CompiledMethod {
    method: MethodHandle,
    start: u64,
    entry: u64,
    end: u64,
    patch_refs: Vec<PatchReference>,
}

impl CompiledMethod {
    pub fn method(&self) -> &MethodHandle {
        &self.method
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn entry(&self) -> u64 {
        self.entry
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn contains(&self, address: u64) -> bool {
        (self.start..self.end).contains(&address)
    }

    /// Address of the code word of instruction `index`.
    pub fn code_position(&self, index: usize) -> u64 {
        self.entry + index as u64 * WORD_SIZE
    }

    pub fn patch_refs(&self) -> &[PatchReference] {
        &self.patch_refs
    }

    pub fn patch_ref_at(&self, code_position: u64) -> Option<&PatchReference> {
        self.patch_refs.binary_search_by_key(&code_position, PatchReference::code_position)
            .ok()
            .map(|i| &self.patch_refs[i])
    }
}
