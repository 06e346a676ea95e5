use std::thread;
use crate::throw;
use crate::vm::class::class::{ClassHandle, ClassState};
use crate::vm::exception::{Exception, ExceptionKind};

/// Runs the static initialization of `class` (superclass first) unless that already happened.
///
/// A thread re-entering the initialization it is running returns immediately; other threads wait
/// until it finished. A failed initialization leaves the class erroneous for good.
pub fn initialize_class(class: &ClassHandle) -> Result<(), Exception> {
    let current = thread::current().id();
    {
        let mut state = class.state.lock();
        loop {
            match *state {
                ClassState::Initialized => return Ok(()),
                ClassState::Initializing(owner) if owner == current => return Ok(()),
                ClassState::Initializing(_) => class.state_changed.wait(&mut state),
                ClassState::Erroneous => return Err(throw!(NoClassDefFound,
                    "Could not initialize class {}", class.data.name)),
                ClassState::Linked => break
            }
        }

        *state = ClassState::Initializing(current);
    }

    log::trace!("Initializing {}", class.data.name);

    let result = run_initializers(class);
    let mut state = class.state.lock();
    *state = match result {
        Ok(()) => ClassState::Initialized,
        Err(_) => ClassState::Erroneous
    };
    class.state_changed.notify_all();
    drop(state);

    match result {
        Ok(()) => {
            log::trace!("Initialized {}", class.data.name);
            Ok(())
        }
        Err(e) => {
            log::debug!("Initialization of {} failed: {}", class.data.name, e);
            Err(e)
        }
    }
}

fn run_initializers(class: &ClassHandle) -> Result<(), Exception> {
    // Superinterfaces are not initialized together with the class
    if !class.is_interface() {
        if let Some(superclass) = &class.data.superclass {
            initialize_class(superclass)?;
        }
    }

    match &class.data.initializer {
        Some(initializer) => initializer(class).map_err(|e| match e.kind {
            ExceptionKind::ExceptionInInitializer | ExceptionKind::NoClassDefFound => e,
            _ => throw!(ExceptionInInitializer, "{} in initializer of {}", e, class.data.name)
        }),
        None => Ok(())
    }
}
