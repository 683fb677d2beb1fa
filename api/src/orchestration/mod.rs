pub mod duration;
pub mod launcher;
pub mod probe;
pub mod sequencer;
pub mod topology;
