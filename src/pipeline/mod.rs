// Pipeline composition module
// Orchestrates loader and analysis instances, with optional JSONL tracing

pub mod rhythm;
pub mod trace;

pub use rhythm::{
    analyze_files, analyze_rhythm, analyze_rhythm_with, analyze_signal, analyze_wav_bytes, stream_rhythm, stream_signal,
    RhythmReport,
};
pub use trace::{read_trace_file, TraceBuilder, TraceEntry, TraceError, TraceStatus, TraceWriter};
