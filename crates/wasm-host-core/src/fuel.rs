//! Per-store fuel metering.
//!
//! A [`Fuel`] meter is either disabled, in which case every query is a
//! configuration error and executors run unmetered, or enabled with a
//! remaining amount that only ever decreases through consumption and is
//! replaced wholesale by [`Fuel::set_fuel`].

use wasm_host_common::{FuelCosts, RuntimeError, Trap};

/// An error that may be encountered when using [`Fuel`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FuelError {
    /// Returned by [`Fuel`] queries when fuel metering is disabled.
    #[error("fuel metering is disabled")]
    FuelMeteringDisabled,
    /// Raised when trying to consume more fuel than is available.
    #[error("out of fuel: {required_fuel} required")]
    OutOfFuel { required_fuel: u64 },
}

impl FuelError {
    #[cold]
    fn fuel_metering_disabled() -> Self {
        Self::FuelMeteringDisabled
    }

    #[cold]
    fn out_of_fuel(required_fuel: u64) -> Self {
        Self::OutOfFuel { required_fuel }
    }
}

impl From<FuelError> for RuntimeError {
    fn from(error: FuelError) -> Self {
        match error {
            FuelError::FuelMeteringDisabled => RuntimeError::FuelMeteringDisabled,
            FuelError::OutOfFuel { required_fuel } => {
                RuntimeError::Trap(Trap::OutOfFuel { required_fuel })
            }
        }
    }
}

/// Observable state of a [`Fuel`] meter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FuelState {
    /// Fuel metering is off for this store.
    Disabled,
    /// Fuel metering is on with `remaining` units left.
    Enabled { remaining: u64 },
}

/// The remaining fuel of a store.
#[derive(Debug)]
pub struct Fuel {
    /// The remaining fuel.
    remaining: u64,
    /// This is `true` if fuel metering is enabled.
    enabled: bool,
    /// The fuel costs.
    costs: FuelCosts,
}

impl Fuel {
    /// Creates a new [`Fuel`] meter with no fuel.
    pub fn new(enabled: bool, costs: FuelCosts) -> Self {
        Self {
            remaining: 0,
            enabled,
            costs,
        }
    }

    /// Returns `true` if fuel metering is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the [`FuelState`] of the meter.
    pub fn state(&self) -> FuelState {
        if self.enabled {
            FuelState::Enabled {
                remaining: self.remaining,
            }
        } else {
            FuelState::Disabled
        }
    }

    /// Returns the [`FuelCosts`] units of work are priced with.
    pub fn costs(&self) -> &FuelCosts {
        &self.costs
    }

    fn check_fuel_metering_enabled(&self) -> Result<(), FuelError> {
        if !self.enabled {
            return Err(FuelError::fuel_metering_disabled());
        }
        Ok(())
    }

    /// Sets the remaining fuel to `fuel`.
    ///
    /// # Errors
    ///
    /// If fuel metering is disabled.
    pub fn set_fuel(&mut self, fuel: u64) -> Result<(), FuelError> {
        self.check_fuel_metering_enabled()?;
        self.remaining = fuel;
        Ok(())
    }

    /// Returns the remaining fuel.
    ///
    /// # Errors
    ///
    /// If fuel metering is disabled.
    pub fn get_fuel(&self) -> Result<u64, FuelError> {
        self.check_fuel_metering_enabled()?;
        Ok(self.remaining)
    }

    /// Consumes `delta` fuel without checking whether metering is enabled.
    ///
    /// Returns the remaining fuel. If `delta` exceeds the remaining fuel the
    /// meter drops to zero and the call fails, as does every later call with
    /// a non-zero `delta` until fuel is set again.
    ///
    /// # Errors
    ///
    /// If out of fuel.
    pub fn consume_fuel_unchecked(&mut self, delta: u64) -> Result<u64, FuelError> {
        match self.remaining.checked_sub(delta) {
            Some(remaining) => {
                self.remaining = remaining;
                Ok(remaining)
            }
            None => {
                self.remaining = 0;
                Err(FuelError::out_of_fuel(delta))
            }
        }
    }

    /// Consumes the amount of fuel `f` computes from the [`FuelCosts`].
    ///
    /// Returns the remaining fuel.
    ///
    /// # Errors
    ///
    /// - If fuel metering is disabled.
    /// - If out of fuel.
    pub fn consume_fuel(&mut self, f: impl FnOnce(&FuelCosts) -> u64) -> Result<u64, FuelError> {
        self.check_fuel_metering_enabled()?;
        let delta = f(&self.costs);
        self.consume_fuel_unchecked(delta)
    }

    /// Consumes fuel like [`Fuel::consume_fuel`] if metering is enabled.
    ///
    /// Does nothing when fuel metering is disabled.
    ///
    /// # Errors
    ///
    /// If out of fuel.
    pub fn consume_fuel_if(&mut self, f: impl FnOnce(&FuelCosts) -> u64) -> Result<(), Trap> {
        if !self.enabled {
            return Ok(());
        }
        let delta = f(&self.costs);
        self.consume_fuel_unchecked(delta)
            .map_err(|_| Trap::OutOfFuel {
                required_fuel: delta,
            })?;
        Ok(())
    }
}
