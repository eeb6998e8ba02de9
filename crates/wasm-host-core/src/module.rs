//! Module validation against an engine's feature gates.
//!
//! This module provides [`ModuleSummary`], the outcome of checking a module
//! binary with the [`Engine`]'s feature set and compilation mode.
//!
//! # Compilation Modes
//!
//! - **Eager** and **LazyTranslation**: every function body is validated
//!   before the module is accepted
//! - **Lazy**: function bodies are only counted; their validation is left to
//!   first use

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

use tracing::{debug, info, instrument};
use wasmparser::{
    BinaryReaderError, FuncValidatorAllocations, Parser, Payload, ValidPayload, Validator,
};

use wasm_host_common::{CompilationMode, RuntimeError};

use crate::Engine;

/// A custom section kept from a validated module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomSection {
    pub name: String,
    pub data: Vec<u8>,
}

/// Result of validating a module binary.
#[derive(Debug, Clone)]
pub struct ModuleSummary {
    /// Hash of the original Wasm bytes.
    content_hash: String,

    /// Function bodies validated up front.
    validated_functions: usize,

    /// Function bodies whose validation was deferred.
    deferred_functions: usize,

    /// Custom sections, empty when the engine ignores them.
    custom_sections: Vec<CustomSection>,
}

impl ModuleSummary {
    /// Validate `wasm` with the feature set and compilation mode of `engine`.
    ///
    /// # Errors
    ///
    /// Returns an error if the module is malformed or uses a disabled proposal.
    #[instrument(skip(engine, wasm), fields(bytes_len = wasm.len()))]
    pub(crate) fn validate(engine: &Engine, wasm: &[u8]) -> Result<Self, RuntimeError> {
        let start = Instant::now();
        let config = engine.config();

        Self::validate_wasm_header(wasm)?;

        let defer_bodies = matches!(config.get_compilation_mode(), CompilationMode::Lazy);
        let keep_custom_sections = !config.get_ignore_custom_sections();

        let mut validator = Validator::new_with_features(engine.features());
        let mut allocations = FuncValidatorAllocations::default();
        let mut summary = Self {
            content_hash: compute_hash(wasm),
            validated_functions: 0,
            deferred_functions: 0,
            custom_sections: Vec::new(),
        };

        for payload in Parser::new(0).parse_all(wasm) {
            let payload = payload.map_err(into_validation_error)?;

            if let Payload::CustomSection(reader) = &payload {
                if keep_custom_sections {
                    summary.custom_sections.push(CustomSection {
                        name: reader.name().to_string(),
                        data: reader.data().to_vec(),
                    });
                }
            }

            match validator.payload(&payload).map_err(into_validation_error)? {
                ValidPayload::Func(func, body) => {
                    if defer_bodies {
                        summary.deferred_functions += 1;
                        continue;
                    }
                    let mut func_validator = func.into_validator(allocations);
                    func_validator
                        .validate(&body)
                        .map_err(into_validation_error)?;
                    allocations = func_validator.into_allocations();
                    summary.validated_functions += 1;
                }
                ValidPayload::End(_) => break,
                _ => {}
            }
        }

        info!(
            content_hash = %summary.content_hash,
            validated_functions = summary.validated_functions,
            deferred_functions = summary.deferred_functions,
            duration_us = start.elapsed().as_micros(),
            "Module validated"
        );

        Ok(summary)
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < 8 {
            return Err(RuntimeError::validation("file too small", 0));
        }

        // Check magic number: \0asm
        if &bytes[0..4] != b"\0asm" {
            debug!("Rejecting module without Wasm magic number");
            return Err(RuntimeError::validation("bad magic number", 0));
        }

        Ok(())
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Number of function bodies validated up front.
    pub fn validated_functions(&self) -> usize {
        self.validated_functions
    }

    /// Number of function bodies left for validation on first use.
    pub fn deferred_functions(&self) -> usize {
        self.deferred_functions
    }

    /// Custom sections in the order they appeared.
    pub fn custom_sections(&self) -> &[CustomSection] {
        &self.custom_sections
    }
}

fn into_validation_error(error: BinaryReaderError) -> RuntimeError {
    RuntimeError::validation(error.message(), error.offset())
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_host_common::Config;

    // Minimal valid Wasm module (empty module)
    const MINIMAL_WASM: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, // magic: \0asm
        0x01, 0x00, 0x00, 0x00, // version: 1
    ];

    fn engine_with(f: impl FnOnce(&mut Config)) -> Engine {
        let mut config = Config::default();
        f(&mut config);
        Engine::new(&config)
    }

    #[test]
    fn test_validate_wasm_header_valid() {
        assert!(ModuleSummary::validate_wasm_header(MINIMAL_WASM).is_ok());
    }

    #[test]
    fn test_validate_wasm_header_too_small() {
        let result = ModuleSummary::validate_wasm_header(&[0x00, 0x61]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_wasm_header_bad_magic() {
        let bad_wasm = &[0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        let result = ModuleSummary::validate_wasm_header(bad_wasm);
        assert!(matches!(result, Err(RuntimeError::Validation { .. })));
    }

    #[test]
    fn test_compute_hash() {
        let hash1 = compute_hash(b"hello");
        let hash2 = compute_hash(b"hello");
        let hash3 = compute_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 16); // 64-bit hex
    }

    #[test]
    fn test_empty_module() {
        let summary = Engine::default().validate(MINIMAL_WASM).unwrap();

        assert_eq!(summary.validated_functions(), 0);
        assert!(summary.custom_sections().is_empty());
        assert!(!summary.content_hash().is_empty());
    }

    #[test]
    fn test_sign_extension_gate() {
        let wasm = wat::parse_str(
            r#"(module (func (param i32) (result i32) local.get 0 i32.extend8_s))"#,
        )
        .unwrap();

        assert!(Engine::default().validate(&wasm).is_ok());

        let gated = engine_with(|c| {
            c.wasm_sign_extension(false);
        });
        let err = gated.validate(&wasm).unwrap_err();
        assert!(matches!(err, RuntimeError::Validation { .. }));
    }

    #[test]
    fn test_floats_gate() {
        let wasm = wat::parse_str(r#"(module (func (result f32) f32.const 1.5))"#).unwrap();

        assert!(Engine::default().validate(&wasm).is_ok());
        assert!(engine_with(|c| {
            c.floats(false);
        })
        .validate(&wasm)
        .is_err());
    }

    #[test]
    fn test_mutable_global_gate() {
        let wasm =
            wat::parse_str(r#"(module (import "env" "g" (global (mut i32))))"#).unwrap();

        assert!(Engine::default().validate(&wasm).is_ok());
        assert!(engine_with(|c| {
            c.wasm_mutable_global(false);
        })
        .validate(&wasm)
        .is_err());
    }

    #[test]
    fn test_custom_sections_kept_or_ignored() {
        let wasm = wat::parse_str(r#"(module (@custom "meta" "abc"))"#).unwrap();

        let summary = Engine::default().validate(&wasm).unwrap();
        assert_eq!(
            summary.custom_sections(),
            &[CustomSection {
                name: "meta".into(),
                data: b"abc".to_vec(),
            }]
        );

        let ignoring = engine_with(|c| {
            c.ignore_custom_sections(true);
        });
        assert!(ignoring.validate(&wasm).unwrap().custom_sections().is_empty());
    }

    #[test]
    fn test_lazy_mode_defers_bodies() {
        // Body is ill-typed: returns nothing but declares an i32 result
        let wasm = wat::parse_str(r#"(module (func (result i32) nop))"#).unwrap();

        assert!(Engine::default().validate(&wasm).is_err());

        let translation_only = engine_with(|c| {
            c.compilation_mode(CompilationMode::LazyTranslation);
        });
        assert!(translation_only.validate(&wasm).is_err());

        let lazy = engine_with(|c| {
            c.compilation_mode(CompilationMode::Lazy);
        });
        let summary = lazy.validate(&wasm).unwrap();
        assert_eq!(summary.deferred_functions(), 1);
        assert_eq!(summary.validated_functions(), 0);
    }
}
