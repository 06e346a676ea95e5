use std::sync::Arc;
use clap::Parser;
use crate::throw;
use crate::vm::class::method::MethodHandle;
use crate::vm::class_loader::bootstrap::ClassArea;
use crate::vm::class_loader::constraints::LoadingConstraints;
use crate::vm::class_loader::resolve::{Resolver, ResolverConfig};
use crate::vm::exception::Exception;
use crate::vm::jit::code::CodeMemory;
use crate::vm::jit::codegen::{decode, is_trap, CodeBuilder, CompiledMethod};
use crate::vm::jit::instructions::{Instruction, Opcode};
use crate::vm::jit::method_tree::MethodTree;
use crate::vm::jit::patcher::TrapOutcome;

/// Runtime options, given the way a JVM receives its `-X`-style switches.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[clap(name = "jvm-resolve", about = "Lazy resolution and call site patching")]
pub struct VmArgs {
    /// Log every successful resolution
    #[clap(long = "verbose-resolve")]
    pub verbose_resolve: bool,
    /// Skip loading constraints between class loaders
    #[clap(long = "no-loading-constraints")]
    pub no_loading_constraints: bool,
    /// Resolve everything while compiling instead of at first execution
    #[clap(long = "eager-resolution")]
    pub eager_resolution: bool,
    /// Size of the code area in words
    #[clap(long = "code-area", default_value_t = 1 << 16)]
    pub code_area: usize,
}

impl VmArgs {
    pub fn from_options(options: &[&str]) -> Result<VmArgs, clap::Error> {
        VmArgs::try_parse_from(std::iter::once("jvm-resolve").chain(options.iter().copied()))
    }
}

impl Default for VmArgs {
    fn default() -> Self {
        VmArgs {
            verbose_resolve: false,
            no_loading_constraints: false,
            eager_resolution: false,
            code_area: 1 << 16,
        }
    }
}

impl From<&VmArgs> for ResolverConfig {
    fn from(args: &VmArgs) -> Self {
        ResolverConfig {
            verbose: args.verbose_resolve,
            loading_constraints: !args.no_loading_constraints,
            eager: args.eager_resolution,
        }
    }
}

/// What the instruction at an address executed with, after any patching.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExecutedSite {
    pub opcode: Opcode,
    /// Contents of the data slot, if the instruction has one
    pub value: Option<u64>,
}

pub struct VM {
    pub args: VmArgs,
    pub classes: Arc<ClassArea>,
    pub resolver: Arc<Resolver>,
    pub code: CodeMemory,
    pub methods: MethodTree,
}

impl VM {
    pub fn init(args: VmArgs) -> Result<VM, Exception> {
        let classes = Arc::new(ClassArea::new(Arc::new(LoadingConstraints::new()))?);
        let resolver = Arc::new(Resolver::new(classes.clone(), ResolverConfig::from(&args)));
        let code = CodeMemory::with_capacity(args.code_area)?;
        log::debug!("VM initialized with {:?}", args);

        Ok(VM { args, classes, resolver, code, methods: MethodTree::default() })
    }

    /// Emits `instructions` as the code of `method` and makes it reachable for trap dispatch.
    pub fn compile(&self, method: &MethodHandle, instructions: &[Instruction])
        -> Result<Arc<CompiledMethod>, Exception> {
        let mut builder = CodeBuilder::new(&self.resolver, method.clone());
        for instruction in instructions {
            builder.emit(instruction)?;
        }

        let compiled = builder.finish(&self.code)?;
        Ok(self.methods.insert(compiled))
    }

    /// Trap dispatch: finds the patch reference for the trapping address and runs it. Errors are
    /// meant to be thrown at the trapping instruction.
    pub fn handle_trap(&self, address: u64) -> Result<TrapOutcome, Exception> {
        let patch_site = self.methods.find(address);
        let patch = patch_site.as_ref().and_then(|m| m.patch_ref_at(address));

        match patch {
            Some(patch) => patch.handle_trap(&self.resolver, &self.code),
            None => {
                log::warn!("Trap at {:#x} without a patch site", address);
                Ok(TrapOutcome::NoPatchSite)
            }
        }
    }

    /// Fetches the instruction at `address` as the processor would, taking the trap first if the
    /// site is not patched yet. `None` for addresses outside compiled code.
    pub fn execute(&self, address: u64) -> Result<Option<ExecutedSite>, Exception> {
        let method = match self.methods.find(address) {
            Some(method) => method,
            None => return Ok(None)
        };

        let mut word = self.read(address)?;
        if is_trap(word) {
            if self.handle_trap(address)? == TrapOutcome::NoPatchSite {
                return Ok(None);
            }
            word = self.read(address)?;
        }

        let (opcode, displacement) = decode(word)
            .ok_or_else(|| throw!(VerifyError, "Illegal code word {:#018x} at {:#x}", word,
                address))?;
        let value = match displacement {
            0 => None,
            d => Some(self.read(method.entry().wrapping_add(d as i64 as u64))?)
        };

        Ok(Some(ExecutedSite { opcode, value }))
    }

    pub fn unload(&self, method: &CompiledMethod) -> bool {
        self.methods.remove(method).is_some()
    }

    fn read(&self, address: u64) -> Result<u64, Exception> {
        self.code.read(address)
            .ok_or_else(|| throw!(LinkageError, "{:#x} is outside the code area", address))
    }
}
