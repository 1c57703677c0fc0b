//! WGSL compilation with readable diagnostics.
//!
//! Sources are parsed and validated with `naga` before wgpu sees them, so a
//! broken shader surfaces as a [`ShaderError`] carrying the rendered compiler
//! output instead of a device-level panic.

use std::borrow::Cow;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to parse shader '{label}':\n{diagnostic}")]
    Parse { label: String, diagnostic: String },

    #[error("shader '{label}' failed validation:\n{diagnostic}")]
    Validation { label: String, diagnostic: String },
}

impl ShaderError {
    pub fn label(&self) -> &str {
        match self {
            ShaderError::Parse { label, .. } | ShaderError::Validation { label, .. } => label,
        }
    }
}

/// Parses and validates WGSL into a `naga` module.
pub fn parse_wgsl(label: &str, source: &str) -> Result<naga::Module, ShaderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Parse {
        label: label.to_string(),
        diagnostic: e.emit_to_string(source),
    })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|e| ShaderError::Validation {
        label: label.to_string(),
        diagnostic: e.emit_to_string(source),
    })?;

    Ok(module)
}

/// Compiles WGSL into a shader module, failing before device submission if
/// the source is invalid.
pub fn compile_wgsl(
    device: &wgpu::Device,
    label: &str,
    source: &str,
) -> Result<wgpu::ShaderModule, ShaderError> {
    let module = parse_wgsl(label, source)?;
    log::debug!("shader '{label}' validated");

    Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Naga(Cow::Owned(module)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSTHROUGH: &str = r#"
        @vertex
        fn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {
            let x = f32(i & 1u) * 2.0 - 1.0;
            return vec4<f32>(x, 0.0, 0.0, 1.0);
        }
    "#;

    #[test]
    fn valid_source_produces_a_module() {
        let module = parse_wgsl("passthrough", PASSTHROUGH).unwrap();
        assert_eq!(module.entry_points.len(), 1);
        assert_eq!(module.entry_points[0].name, "vs_main");
    }

    #[test]
    fn syntax_error_reports_label_and_location() {
        let err = parse_wgsl("broken", "fn main( {").unwrap_err();
        assert!(matches!(err, ShaderError::Parse { .. }));
        assert_eq!(err.label(), "broken");
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let src = "fn f() -> f32 { return missing_value; }";
        assert!(parse_wgsl("unknown", src).is_err());
    }
}
