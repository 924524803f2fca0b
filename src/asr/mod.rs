//! Recognition dispatch: the bridge between closed audio segments and the
//! external ASR engine.

pub mod dispatcher;
pub mod engine;
pub mod polish;
