//! Lifecycle forwarding.
//!
//! After a successful bootstrap the application object is handed to a [`HostContext`]
//! (normally the [`GameLoop`]), which owns it and routes host lifecycle events to its
//! capability methods. Nothing here adapts or checks the object again.

/// The capability set every application object provides.
///
/// Guest objects implement this through [`crate::adapter::GuestApplication`]; native
/// applications implement it directly.
pub trait Application {
    fn initialize(&mut self) -> anyhow::Result<()>;
    fn render(&mut self, delta_seconds: f32) -> anyhow::Result<()>;
    fn pause(&mut self) -> anyhow::Result<()>;
    fn resume(&mut self) -> anyhow::Result<()>;
    fn dispose(&mut self) -> anyhow::Result<()>;
}

impl<A: Application + ?Sized> Application for Box<A> {
    fn initialize(&mut self) -> anyhow::Result<()> {
        (**self).initialize()
    }

    fn render(&mut self, delta_seconds: f32) -> anyhow::Result<()> {
        (**self).render(delta_seconds)
    }

    fn pause(&mut self) -> anyhow::Result<()> {
        (**self).pause()
    }

    fn resume(&mut self) -> anyhow::Result<()> {
        (**self).resume()
    }

    fn dispose(&mut self) -> anyhow::Result<()> {
        (**self).dispose()
    }
}

/// The host side of the lifecycle: receives the application once, then the host's
/// frame and focus events.
pub trait HostContext {
    /// Take ownership of the application and start it.
    fn initialize(&mut self, app: Box<dyn Application>);
    fn render(&mut self, delta_seconds: f32);
    fn pause(&mut self);
    fn resume(&mut self);
    fn dispose(&mut self);
}

/// Bind an adapted application into the host loop.
pub fn forward<H: HostContext + ?Sized>(host: &mut H, app: Box<dyn Application>) {
    tracing::info!("forwarding application to the host loop");
    host.initialize(app);
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LoopPhase {
    /// No application yet.
    #[default]
    Idle,
    Running,
    Paused,
    /// The application has been disposed; further events are ignored.
    Disposed,
}

/// Default [`HostContext`]: drives one application through its lifecycle.
///
/// Guest errors never escape the loop. They are logged and the loop carries on, so a
/// misbehaving guest cannot take the host down with it.
#[derive(Default)]
pub struct GameLoop {
    app: Option<Box<dyn Application>>,
    phase: LoopPhase,
    frames: u64,
    guest_errors: u64,
}

impl GameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Frames rendered so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Capability calls that returned an error.
    pub fn guest_errors(&self) -> u64 {
        self.guest_errors
    }

    pub fn has_application(&self) -> bool {
        self.app.is_some()
    }

    fn call(
        &mut self,
        method: &'static str,
        f: impl FnOnce(&mut dyn Application) -> anyhow::Result<()>,
    ) {
        let Some(app) = self.app.as_deref_mut() else {
            return;
        };
        if let Err(e) = f(app) {
            self.guest_errors += 1;
            tracing::warn!(method, error = %format!("{e:#}"), "application method failed");
        }
    }
}

impl HostContext for GameLoop {
    fn initialize(&mut self, app: Box<dyn Application>) {
        if self.app.is_some() || self.phase() == LoopPhase::Disposed {
            tracing::warn!(phase = ?self.phase(), "game loop already bound, ignoring application");
            return;
        }

        self.app = Some(app);
        self.phase = LoopPhase::Running;
        self.call("initialize", |app| app.initialize());
    }

    fn render(&mut self, delta_seconds: f32) {
        if self.phase() != LoopPhase::Running {
            return;
        }
        self.frames += 1;
        self.call("render", |app| app.render(delta_seconds));
    }

    fn pause(&mut self) {
        if self.phase() != LoopPhase::Running {
            return;
        }
        self.phase = LoopPhase::Paused;
        self.call("pause", |app| app.pause());
    }

    fn resume(&mut self) {
        if self.phase() != LoopPhase::Paused {
            return;
        }
        self.phase = LoopPhase::Running;
        self.call("resume", |app| app.resume());
    }

    fn dispose(&mut self) {
        match self.phase() {
            LoopPhase::Idle | LoopPhase::Disposed => return,
            LoopPhase::Running => self.pause(),
            LoopPhase::Paused => {}
        }

        self.call("dispose", |app| app.dispose());
        self.phase = LoopPhase::Disposed;
        self.app = None;
        tracing::debug!(frames = self.frames, "application disposed");
    }
}

impl std::fmt::Debug for GameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameLoop")
            .field("phase", &self.phase())
            .field("frames", &self.frames)
            .field("guest_errors", &self.guest_errors)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Native application that records every call.
    #[derive(Clone, Default)]
    pub(crate) struct Recorder {
        pub calls: Rc<RefCell<Vec<String>>>,
        pub fail_render: bool,
    }

    impl Recorder {
        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn push(&self, call: impl Into<String>) -> anyhow::Result<()> {
            self.calls.borrow_mut().push(call.into());
            Ok(())
        }
    }

    impl Application for Recorder {
        fn initialize(&mut self) -> anyhow::Result<()> {
            self.push("initialize")
        }

        fn render(&mut self, _delta_seconds: f32) -> anyhow::Result<()> {
            self.push("render")?;
            if self.fail_render {
                anyhow::bail!("render exploded");
            }
            Ok(())
        }

        fn pause(&mut self) -> anyhow::Result<()> {
            self.push("pause")
        }

        fn resume(&mut self) -> anyhow::Result<()> {
            self.push("resume")
        }

        fn dispose(&mut self) -> anyhow::Result<()> {
            self.push("dispose")
        }
    }

    #[test]
    fn events_before_forwarding_are_ignored() {
        let mut game = GameLoop::new();
        game.render(0.016);
        game.pause();
        game.dispose();
        assert_eq!(game.phase(), LoopPhase::Idle);
        assert_eq!(game.frames(), 0);
    }

    #[test]
    fn forward_initializes_once_and_routes_events() {
        let app = Recorder::default();
        let mut game = GameLoop::new();

        forward(&mut game, Box::new(app.clone()));
        game.render(0.016);
        game.render(0.016);
        game.pause();
        game.render(0.016);
        game.resume();
        game.dispose();

        assert_eq!(
            app.calls(),
            ["initialize", "render", "render", "pause", "resume", "pause", "dispose"]
        );
        assert_eq!(game.frames(), 2);
        assert_eq!(game.phase(), LoopPhase::Disposed);
    }

    #[test]
    fn pause_and_resume_are_edge_triggered() {
        let app = Recorder::default();
        let mut game = GameLoop::new();
        forward(&mut game, Box::new(app.clone()));

        game.resume();
        game.pause();
        game.pause();
        game.resume();
        game.resume();

        assert_eq!(app.calls(), ["initialize", "pause", "resume"]);
    }

    #[test]
    fn dispose_runs_once_and_leaves_the_loop_inert() {
        let app = Recorder::default();
        let mut game = GameLoop::new();
        forward(&mut game, Box::new(app.clone()));

        game.pause();
        game.dispose();
        game.dispose();
        game.render(0.016);
        game.initialize(Box::new(Recorder::default()));

        assert_eq!(app.calls(), ["initialize", "pause", "dispose"]);
        assert!(!game.has_application());
        assert_eq!(game.phase(), LoopPhase::Disposed);
    }

    #[test]
    fn second_application_is_rejected() {
        let first = Recorder::default();
        let second = Recorder::default();
        let mut game = GameLoop::new();

        forward(&mut game, Box::new(first.clone()));
        forward(&mut game, Box::new(second.clone()));

        assert_eq!(first.calls(), ["initialize"]);
        assert!(second.calls().is_empty());
    }

    #[test]
    fn guest_errors_are_contained() {
        let app = Recorder {
            fail_render: true,
            ..Recorder::default()
        };
        let mut game = GameLoop::new();
        forward(&mut game, Box::new(app.clone()));

        game.render(0.016);
        game.render(0.016);

        assert_eq!(game.guest_errors(), 2);
        assert_eq!(game.phase(), LoopPhase::Running);
        assert_eq!(app.calls(), ["initialize", "render", "render"]);
    }
}
