//! Model Boundary Module
//!
//! Typed per-family model options and the client for the external model
//! servers that perform the actual voice generation.

mod client;
mod families;

pub use client::{decode_error_message, HttpModelClient, ModelBoundary, ModelInputs, ModelRequest};
pub use families::{
    ModelDescriptor, ModelFamily, ModelOptions, RvcOptions, SoVitsSvc3Options, SoVitsSvc4Options,
    SoVitsSvc5Options, StyleTts2Options, SvcOptions, TalknetOptions, CONTROLLABLE_TALKNET, RVC,
    SO_VITS_SVC_3, SO_VITS_SVC_4, SO_VITS_SVC_5, STYLETTS_2,
};
