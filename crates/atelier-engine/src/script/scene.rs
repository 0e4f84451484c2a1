use crate::resources::RenderContext;

use super::{Script, ScriptCtx};

/// Object-safe view of a script, so a scene can hold scripts of different
/// state types.
pub trait SceneScript {
    fn name(&self) -> &str;
    fn run(&mut self, ctx: &mut ScriptCtx<'_>) -> anyhow::Result<()>;
    fn reload(&mut self, ctx: &mut RenderContext) -> anyhow::Result<()>;
    fn teardown(&mut self, ctx: &mut RenderContext);
}

impl<S> SceneScript for Script<S> {
    fn name(&self) -> &str {
        Script::name(self)
    }

    fn run(&mut self, ctx: &mut ScriptCtx<'_>) -> anyhow::Result<()> {
        Script::run(self, ctx)
    }

    fn reload(&mut self, ctx: &mut RenderContext) -> anyhow::Result<()> {
        Script::reload(self, ctx)
    }

    fn teardown(&mut self, ctx: &mut RenderContext) {
        Script::teardown(self, ctx)
    }
}

struct Slot {
    script: Box<dyn SceneScript>,
    enabled: bool,
}

/// Scripts in insertion order.
///
/// A script whose update fails is logged once and disabled; the others keep
/// running. A successful reload re-enables it.
#[derive(Default)]
pub struct Scene {
    slots: Vec<Slot>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `script`, replacing in place any script with the same name.
    ///
    /// The replaced script is returned so the caller can tear it down.
    pub fn add(&mut self, script: impl SceneScript + 'static) -> Option<Box<dyn SceneScript>> {
        let slot = Slot { script: Box::new(script), enabled: true };
        match self.slots.iter().position(|s| s.script.name() == slot.script.name()) {
            Some(index) => {
                log::debug!("script `{}` replaced", slot.script.name());
                Some(std::mem::replace(&mut self.slots[index], slot).script)
            }
            None => {
                self.slots.push(slot);
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn SceneScript>> {
        let index = self.slots.iter().position(|s| s.script.name() == name)?;
        Some(self.slots.remove(index).script)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.script.name())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `None` for unknown names.
    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.slots.iter().find(|s| s.script.name() == name).map(|s| s.enabled)
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.slots.iter_mut().find(|s| s.script.name() == name) {
            Some(slot) => {
                slot.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Runs every enabled script once. Returns how many ran successfully.
    pub fn render(&mut self, ctx: &mut ScriptCtx<'_>) -> usize {
        let mut ok = 0;
        for slot in self.slots.iter_mut().filter(|s| s.enabled) {
            match slot.script.run(ctx) {
                Ok(()) => ok += 1,
                Err(err) => {
                    log::error!("{err:#}; script `{}` disabled", slot.script.name());
                    slot.enabled = false;
                }
            }
        }
        ok
    }

    /// Reloads every script. Returns the names that failed; those stay
    /// disabled, the rest are enabled again.
    pub fn reload(&mut self, ctx: &mut RenderContext) -> Vec<String> {
        let mut failed = Vec::new();
        for slot in &mut self.slots {
            match slot.script.reload(ctx) {
                Ok(()) => slot.enabled = true,
                Err(err) => {
                    log::error!("{err:#}");
                    slot.enabled = false;
                    failed.push(slot.script.name().to_string());
                }
            }
        }
        log::info!("scene reloaded ({} of {} scripts ok)", self.slots.len() - failed.len(), self.slots.len());
        failed
    }

    /// Tears every script down, last added first, and empties the scene.
    pub fn teardown(&mut self, ctx: &mut RenderContext) {
        while let Some(mut slot) = self.slots.pop() {
            slot.script.teardown(ctx);
        }
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.slots.iter().map(|s| (s.script.name(), s.enabled))).finish()
    }
}
