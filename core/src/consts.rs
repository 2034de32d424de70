//! Constants shared across the compiler and emulator.

/// Size, in bytes, of the emulator's flat memory image (spec §4.10).
pub const MEM_SIZE: usize = 1 << 20;

/// The maximum number of cycles a program may run for before the emulator
/// kills it. Programs that take exactly this many cycles terminate
/// normally; one more and [crate::error::RuntimeError::TooManyCycles] is
/// raised. Mirrors the predecessor's own runaway-loop guard
/// (`MAX_CYCLE_COUNT` in `consts.rs`), just sized up for an instruction set
/// with no dedicated loop-control opcode.
pub const MAX_CYCLE_COUNT: usize = 1_000_000;
