//! Per-frame scripts.
//!
//! A [`Script`] owns user state (usually its entities) and a set of named
//! update callbacks run in ascending name order every frame. A [`Scene`] holds
//! scripts in insertion order, and [`SceneApp`] drives a scene from the
//! runtime: clear, render every script, capture on request, tear down on exit.
//!
//! Ordering is by name on purpose: give a callback a name that sorts first
//! (`"0_setup"`, `"a_…"`) to run it before the others.

mod app;
mod scene;
mod script;

pub use app::{SceneApp, SceneKeys};
pub use scene::{Scene, SceneScript};
pub use script::{Script, ScriptCtx};
