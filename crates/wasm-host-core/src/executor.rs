//! The boundary between a store and the code running against it.
//!
//! An [`Executor`] receives an exclusive context for the duration of one
//! call. It prices its units of work with [`StoreContextMut::consume_fuel_if`]
//! and stops with a [`Trap`] once the meter runs dry. [`execute`] brackets
//! the call with the store's call hook and records what it cost.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use wasm_host_common::{RuntimeError, Trap};

use crate::context::{AsContextMut, StoreContextMut};

/// Direction of a transition observed by a store's call hook.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CallHook {
    /// Execution is about to enter the executor.
    CallingWasm,
    /// Execution has left the executor, normally or by trapping.
    ReturningFromWasm,
}

/// Code that runs against a store.
pub trait Executor {
    /// Value produced by a completed run.
    type Output;

    /// Run to completion or until a trap.
    ///
    /// # Errors
    ///
    /// Returns the [`Trap`] that halted execution.
    fn execute(&mut self, ctx: StoreContextMut<'_>) -> Result<Self::Output, Trap>;
}

/// Run `executor` against the store behind `ctx`.
///
/// # Errors
///
/// Returns [`RuntimeError::Trap`] if the call hook or the executor trapped.
/// A trap from the executor takes precedence over one raised by the hook on
/// the way out.
#[instrument(skip_all)]
pub fn execute<E: Executor>(
    mut ctx: impl AsContextMut,
    executor: &mut E,
) -> Result<E::Output, RuntimeError> {
    let mut ctx = ctx.as_context_mut();
    let start = Instant::now();
    let initial_fuel = ctx.get_fuel().ok();

    debug!(store = %ctx.store_id(), "Entering executor");

    invoke_call_hook(ctx.as_context_mut(), CallHook::CallingWasm)?;
    let result = executor.execute(ctx.as_context_mut());
    let returned = invoke_call_hook(ctx.as_context_mut(), CallHook::ReturningFromWasm);

    let fuel_consumed = calculate_fuel_consumed(initial_fuel, &ctx);
    let duration = start.elapsed();

    let result = result.and_then(|output| returned.map(|()| output));
    match result {
        Ok(output) => {
            info!(
                duration_us = duration.as_micros(),
                fuel_consumed = fuel_consumed,
                "Execution completed successfully"
            );
            Ok(output)
        }
        Err(trap) if trap.is_out_of_fuel() => {
            warn!(
                duration_us = duration.as_micros(),
                fuel_consumed = fuel_consumed,
                "Execution terminated: fuel exhausted"
            );
            Err(trap.into())
        }
        Err(trap) => {
            warn!(
                duration_us = duration.as_micros(),
                fuel_consumed = fuel_consumed,
                trap_message = %trap,
                "Execution trapped"
            );
            Err(trap.into())
        }
    }
}

fn invoke_call_hook(mut ctx: StoreContextMut<'_>, kind: CallHook) -> Result<(), Trap> {
    let Some(mut hook) = ctx.store.call_hook.take() else {
        return Ok(());
    };
    let result = hook(ctx.as_context_mut(), kind);
    ctx.store.call_hook = Some(hook);
    result
}

/// Fuel spent since `initial`, zero when metering is disabled.
fn calculate_fuel_consumed(initial: Option<u64>, ctx: &StoreContextMut<'_>) -> u64 {
    match (initial, ctx.get_fuel()) {
        (Some(initial), Ok(remaining)) => initial.saturating_sub(remaining),
        _ => 0,
    }
}
