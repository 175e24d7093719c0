//! WASM engine configuration

use serde::{Deserialize, Serialize};
use tracing::info;
use wasmtime::{Config, Engine};

use crate::error::LoadError;

/// Optimization level for compilation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationLevel {
    None,
    Speed,
    SpeedAndSize,
}

/// Engine configuration shared by every load context of a loader
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Cranelift optimization level
    pub optimization_level: OptimizationLevel,
    /// Enable parallel compilation
    pub parallel_compilation: bool,
    /// Fuel granted to each render call, `None` disables metering
    pub fuel_per_render: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            optimization_level: OptimizationLevel::Speed,
            parallel_compilation: true,
            fuel_per_render: Some(10_000_000),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_optimization(mut self, level: OptimizationLevel) -> Self {
        self.optimization_level = level;
        self
    }

    pub fn with_fuel_per_render(mut self, fuel: Option<u64>) -> Self {
        self.fuel_per_render = fuel;
        self
    }

    /// Convert to wasmtime Config
    fn to_wasmtime_config(&self) -> Config {
        let mut config = Config::new();

        config.consume_fuel(self.fuel_per_render.is_some());

        match self.optimization_level {
            OptimizationLevel::None => {
                config.cranelift_opt_level(wasmtime::OptLevel::None);
            }
            OptimizationLevel::Speed => {
                config.cranelift_opt_level(wasmtime::OptLevel::Speed);
            }
            OptimizationLevel::SpeedAndSize => {
                config.cranelift_opt_level(wasmtime::OptLevel::SpeedAndSize);
            }
        }

        config.parallel_compilation(self.parallel_compilation);

        config
    }

    /// Create the engine
    pub fn build_engine(&self) -> Result<Engine, LoadError> {
        let engine = Engine::new(&self.to_wasmtime_config())
            .map_err(|e| LoadError::Engine(e.to_string()))?;
        info!(
            "WASM engine created with config: {:?}, fuel per render: {:?}",
            self.optimization_level, self.fuel_per_render
        );
        Ok(engine)
    }
}
