//! End-to-end pipeline scenarios

mod helpers;

mod dependency_gating;
mod deploy_hook;
mod full_pipeline;
mod timeout_cleanup;
mod trigger_debounce;
