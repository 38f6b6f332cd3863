//! Translator tuning presets.
//!
//! Each preset is a fixed bundle of environment variables. Unknown names
//! fall back to the conservative default of their family.

use super::env::EnvVars;

pub const STABILITY: &str = "STABILITY";
pub const COMPATIBILITY: &str = "COMPATIBILITY";
pub const INTERMEDIATE: &str = "INTERMEDIATE";
pub const PERFORMANCE: &str = "PERFORMANCE";

type Bundle = &'static [(&'static str, &'static str)];

const BOX64_STABILITY: Bundle = &[
    ("BOX64_DYNAREC_SAFEFLAGS", "2"),
    ("BOX64_DYNAREC_FASTNAN", "0"),
    ("BOX64_DYNAREC_FASTROUND", "0"),
    ("BOX64_DYNAREC_X87DOUBLE", "1"),
    ("BOX64_DYNAREC_BIGBLOCK", "0"),
    ("BOX64_DYNAREC_STRONGMEM", "2"),
    ("BOX64_DYNAREC_FORWARD", "128"),
    ("BOX64_DYNAREC_CALLRET", "0"),
    ("BOX64_DYNAREC_WAIT", "0"),
    ("BOX64_AVX", "0"),
    ("BOX64_UNITYPLAYER", "1"),
    ("BOX64_MMAP32", "0"),
];

const BOX64_COMPATIBILITY: Bundle = &[
    ("BOX64_DYNAREC_SAFEFLAGS", "2"),
    ("BOX64_DYNAREC_FASTNAN", "0"),
    ("BOX64_DYNAREC_FASTROUND", "0"),
    ("BOX64_DYNAREC_X87DOUBLE", "1"),
    ("BOX64_DYNAREC_BIGBLOCK", "0"),
    ("BOX64_DYNAREC_STRONGMEM", "1"),
    ("BOX64_DYNAREC_FORWARD", "128"),
    ("BOX64_DYNAREC_CALLRET", "0"),
    ("BOX64_DYNAREC_WAIT", "1"),
    ("BOX64_AVX", "0"),
    ("BOX64_UNITYPLAYER", "1"),
    ("BOX64_MMAP32", "0"),
];

const BOX64_INTERMEDIATE: Bundle = &[
    ("BOX64_DYNAREC_SAFEFLAGS", "2"),
    ("BOX64_DYNAREC_FASTNAN", "1"),
    ("BOX64_DYNAREC_FASTROUND", "0"),
    ("BOX64_DYNAREC_X87DOUBLE", "1"),
    ("BOX64_DYNAREC_BIGBLOCK", "1"),
    ("BOX64_DYNAREC_STRONGMEM", "0"),
    ("BOX64_DYNAREC_FORWARD", "128"),
    ("BOX64_DYNAREC_CALLRET", "0"),
    ("BOX64_DYNAREC_WAIT", "1"),
    ("BOX64_AVX", "0"),
    ("BOX64_UNITYPLAYER", "0"),
    ("BOX64_MMAP32", "1"),
];

const BOX64_PERFORMANCE: Bundle = &[
    ("BOX64_DYNAREC_SAFEFLAGS", "1"),
    ("BOX64_DYNAREC_FASTNAN", "1"),
    ("BOX64_DYNAREC_FASTROUND", "1"),
    ("BOX64_DYNAREC_X87DOUBLE", "0"),
    ("BOX64_DYNAREC_BIGBLOCK", "3"),
    ("BOX64_DYNAREC_STRONGMEM", "0"),
    ("BOX64_DYNAREC_FORWARD", "512"),
    ("BOX64_DYNAREC_CALLRET", "1"),
    ("BOX64_DYNAREC_WAIT", "1"),
    ("BOX64_AVX", "0"),
    ("BOX64_UNITYPLAYER", "0"),
    ("BOX64_MMAP32", "1"),
];

const FEXCORE_STABILITY: Bundle = &[
    ("FEX_TSOENABLED", "1"),
    ("FEX_VECTORTSOENABLED", "1"),
    ("FEX_MEMCPYSETTSOENABLED", "1"),
    ("FEX_HALFBARRIERTSOENABLED", "1"),
    ("FEX_X87REDUCEDPRECISION", "0"),
    ("FEX_MULTIBLOCK", "0"),
];

const FEXCORE_COMPATIBILITY: Bundle = &[
    ("FEX_TSOENABLED", "1"),
    ("FEX_VECTORTSOENABLED", "1"),
    ("FEX_MEMCPYSETTSOENABLED", "1"),
    ("FEX_HALFBARRIERTSOENABLED", "1"),
    ("FEX_X87REDUCEDPRECISION", "0"),
    ("FEX_MULTIBLOCK", "1"),
];

const FEXCORE_INTERMEDIATE: Bundle = &[
    ("FEX_TSOENABLED", "1"),
    ("FEX_VECTORTSOENABLED", "0"),
    ("FEX_MEMCPYSETTSOENABLED", "0"),
    ("FEX_HALFBARRIERTSOENABLED", "1"),
    ("FEX_X87REDUCEDPRECISION", "1"),
    ("FEX_MULTIBLOCK", "1"),
];

const FEXCORE_PERFORMANCE: Bundle = &[
    ("FEX_TSOENABLED", "0"),
    ("FEX_VECTORTSOENABLED", "0"),
    ("FEX_MEMCPYSETTSOENABLED", "0"),
    ("FEX_HALFBARRIERTSOENABLED", "0"),
    ("FEX_X87REDUCEDPRECISION", "1"),
    ("FEX_MULTIBLOCK", "1"),
];

/// Box64 variables for `preset`; unknown names get `COMPATIBILITY`.
pub fn box64_env_vars(preset: &str) -> EnvVars {
    let bundle = match preset {
        STABILITY => BOX64_STABILITY,
        INTERMEDIATE => BOX64_INTERMEDIATE,
        PERFORMANCE => BOX64_PERFORMANCE,
        _ => BOX64_COMPATIBILITY,
    };
    bundle.iter().copied().collect()
}

/// FEXCore variables for `preset`; unknown names get `INTERMEDIATE`.
pub fn fexcore_env_vars(preset: &str) -> EnvVars {
    let bundle = match preset {
        STABILITY => FEXCORE_STABILITY,
        COMPATIBILITY => FEXCORE_COMPATIBILITY,
        PERFORMANCE => FEXCORE_PERFORMANCE,
        _ => FEXCORE_INTERMEDIATE,
    };
    bundle.iter().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_box64_preset_is_compatibility() {
        assert_eq!(box64_env_vars("CUSTOM-7"), box64_env_vars(COMPATIBILITY));
        assert_eq!(box64_env_vars(COMPATIBILITY).get("BOX64_MMAP32"), Some("0"));
    }

    #[test]
    fn test_unknown_fexcore_preset_is_intermediate() {
        assert_eq!(fexcore_env_vars(""), fexcore_env_vars(INTERMEDIATE));
    }

    #[test]
    fn test_performance_enables_mmap32() {
        assert_eq!(box64_env_vars(PERFORMANCE).get("BOX64_MMAP32"), Some("1"));
        assert_eq!(
            box64_env_vars(PERFORMANCE).get("BOX64_DYNAREC_BIGBLOCK"),
            Some("3")
        );
    }
}
