//! Task capacity combinations accepted by the serverless execution platform.

use stackline_common::error::{Result, StacklineError};
use stackline_common::types::CpuArchitecture;

/// Memory sizes (MiB) allowed for one CPU size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Memory {
    Fixed(&'static [u32]),
    Stepped { min: u32, max: u32, step: u32 },
}

impl Memory {
    fn accepts(self, memory_mib: u32) -> bool {
        match self {
            Self::Fixed(sizes) => sizes.contains(&memory_mib),
            Self::Stepped { min, max, step } => {
                (min..=max).contains(&memory_mib) && (memory_mib - min) % step == 0
            }
        }
    }

    fn options(self) -> Vec<u32> {
        match self {
            Self::Fixed(sizes) => sizes.to_vec(),
            Self::Stepped { min, max, step } => (min..=max).step_by(step as usize).collect(),
        }
    }

    fn describe(self) -> String {
        match self {
            Self::Fixed(sizes) => format!("one of {sizes:?} MiB"),
            Self::Stepped { min, max, step } => format!("{min}..={max} MiB in {step} MiB steps"),
        }
    }
}

const TABLE: &[(u32, Memory)] = &[
    (256, Memory::Fixed(&[512, 1024, 2048])),
    (512, Memory::Stepped { min: 1024, max: 4096, step: 1024 }),
    (1024, Memory::Stepped { min: 2048, max: 8192, step: 1024 }),
    (2048, Memory::Stepped { min: 4096, max: 16384, step: 1024 }),
    (4096, Memory::Stepped { min: 8192, max: 30720, step: 1024 }),
    (8192, Memory::Stepped { min: 16384, max: 61440, step: 4096 }),
    (16384, Memory::Stepped { min: 32768, max: 122_880, step: 8192 }),
];

fn lookup(cpu: u32) -> Option<Memory> {
    TABLE.iter().find(|(c, _)| *c == cpu).map(|(_, m)| *m)
}

/// Returns the CPU sizes the platform accepts.
#[must_use]
pub fn cpu_sizes() -> Vec<u32> {
    TABLE.iter().map(|(cpu, _)| *cpu).collect()
}

/// Returns every memory size accepted for `cpu`, or `None` for an unknown size.
#[must_use]
pub fn memory_options(cpu: u32) -> Option<Vec<u32>> {
    lookup(cpu).map(Memory::options)
}

/// Checks a CPU/memory pair against the platform table.
///
/// Both architectures share the same table.
///
/// # Errors
///
/// Returns a configuration error naming the accepted memory sizes when the
/// pair is not accepted.
pub fn validate(cpu: u32, memory_mib: u32, architecture: CpuArchitecture) -> Result<()> {
    let Some(memory) = lookup(cpu) else {
        return Err(StacklineError::config(format!(
            "{cpu} CPU units are not accepted for {architecture}; valid sizes: {:?}",
            cpu_sizes()
        )));
    };
    if !memory.accepts(memory_mib) {
        return Err(StacklineError::config(format!(
            "{memory_mib} MiB is not accepted with {cpu} CPU units on {architecture}; use {}",
            memory.describe()
        )));
    }
    tracing::debug!(cpu, memory_mib, architecture = %architecture, "task capacity accepted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_profile_is_accepted_on_arm64() {
        assert!(validate(512, 1024, CpuArchitecture::Arm64).is_ok());
        assert!(validate(512, 1024, CpuArchitecture::X86_64).is_ok());
    }

    #[test]
    fn memory_outside_range_is_rejected() {
        let err = validate(512, 512, CpuArchitecture::Arm64).unwrap_err();
        assert!(err.to_string().contains("1024..=4096"), "got: {err}");
        assert!(validate(512, 5120, CpuArchitecture::Arm64).is_err());
        assert!(validate(1024, 2500, CpuArchitecture::Arm64).is_err());
        assert!(validate(256, 1536, CpuArchitecture::Arm64).is_err());
    }

    #[test]
    fn unknown_cpu_size_is_rejected() {
        let err = validate(300, 1024, CpuArchitecture::Arm64).unwrap_err();
        assert!(matches!(err, StacklineError::Config { .. }));
    }

    #[test]
    fn memory_options_follow_steps() {
        assert_eq!(memory_options(256), Some(vec![512, 1024, 2048]));
        assert_eq!(memory_options(512), Some(vec![1024, 2048, 3072, 4096]));
        assert_eq!(memory_options(100), None);
    }

    #[test]
    fn every_listed_option_validates() {
        for cpu in cpu_sizes() {
            for memory in memory_options(cpu).expect("known cpu") {
                assert!(validate(cpu, memory, CpuArchitecture::Arm64).is_ok());
            }
        }
    }
}
