pub mod gemini;
pub mod remote;
