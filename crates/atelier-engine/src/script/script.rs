use std::collections::{BTreeMap, BTreeSet};

use anyhow::Context;

use crate::core::FrameCtx;
use crate::resources::RenderContext;

/// What update callbacks receive: render context, frame time and input.
pub type ScriptCtx<'a> = FrameCtx<'a>;

type UpdateFn<S> = Box<dyn FnMut(&mut S, &mut ScriptCtx<'_>) -> anyhow::Result<()>>;
type ReloadFn<S> = Box<dyn FnMut(&mut S, &mut RenderContext) -> anyhow::Result<()>>;
type TeardownFn<S> = Box<dyn FnMut(&mut S, &mut RenderContext)>;

struct Update<S> {
    run: UpdateFn<S>,
    once: bool,
}

/// User state plus its named per-frame callbacks.
pub struct Script<S> {
    name: String,
    state: S,
    updates: BTreeMap<String, Update<S>>,
    excluded: BTreeSet<String>,
    on_reload: Option<ReloadFn<S>>,
    on_teardown: Option<TeardownFn<S>>,
}

impl<S> Script<S> {
    pub fn new(name: impl Into<String>, state: S) -> Self {
        Self {
            name: name.into(),
            state,
            updates: BTreeMap::new(),
            excluded: BTreeSet::new(),
            on_reload: None,
            on_teardown: None,
        }
    }

    /// Registers an update run every frame. A name already registered is replaced.
    pub fn on<F>(mut self, name: &str, f: F) -> Self
    where
        F: FnMut(&mut S, &mut ScriptCtx<'_>) -> anyhow::Result<()> + 'static,
    {
        self.updates.insert(name.to_string(), Update { run: Box::new(f), once: false });
        self
    }

    /// Registers an update that excludes itself after its first successful run.
    pub fn once<F>(mut self, name: &str, f: F) -> Self
    where
        F: FnMut(&mut S, &mut ScriptCtx<'_>) -> anyhow::Result<()> + 'static,
    {
        self.updates.insert(name.to_string(), Update { run: Box::new(f), once: true });
        self
    }

    /// Hook run when the scene is asked to reload (typically `reload_shader`).
    pub fn on_reload<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut S, &mut RenderContext) -> anyhow::Result<()> + 'static,
    {
        self.on_reload = Some(Box::new(f));
        self
    }

    /// Hook run at teardown, before the render context is shut down.
    pub fn on_teardown<F>(mut self, f: F) -> Self
    where
        F: FnMut(&mut S, &mut RenderContext) + 'static,
    {
        self.on_teardown = Some(Box::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Update names in run order, excluded ones included.
    pub fn update_names(&self) -> impl Iterator<Item = &str> {
        self.updates.keys().map(String::as_str)
    }

    pub fn exclude(&mut self, name: &str) {
        self.excluded.insert(name.to_string());
    }

    pub fn include(&mut self, name: &str) {
        self.excluded.remove(name);
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.excluded.contains(name)
    }

    /// Runs every non-excluded update in ascending name order.
    ///
    /// Stops at the first failing update.
    pub fn run(&mut self, ctx: &mut ScriptCtx<'_>) -> anyhow::Result<()> {
        for (name, update) in &mut self.updates {
            if self.excluded.contains(name) {
                continue;
            }
            (update.run)(&mut self.state, ctx)
                .with_context(|| format!("update `{name}` of script `{}` failed", self.name))?;
            if update.once {
                log::debug!("script `{}`: `{name}` ran once, excluding", self.name);
                self.excluded.insert(name.clone());
            }
        }
        Ok(())
    }

    pub fn reload(&mut self, ctx: &mut RenderContext) -> anyhow::Result<()> {
        match &mut self.on_reload {
            Some(reload) => reload(&mut self.state, ctx).with_context(|| format!("reload of script `{}` failed", self.name)),
            None => Ok(()),
        }
    }

    pub fn teardown(&mut self, ctx: &mut RenderContext) {
        if let Some(teardown) = &mut self.on_teardown {
            teardown(&mut self.state, ctx);
        }
    }
}

impl<S> std::fmt::Debug for Script<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("updates", &self.updates.keys().collect::<Vec<_>>())
            .field("excluded", &self.excluded)
            .finish_non_exhaustive()
    }
}
