// pps-physics guest: a handful of balls falling in a box.
//
// Compiled to `wasm32-unknown-unknown` and loaded by `pps-launcher-core` as namespace
// `pps-physics.core`. The host drives it through the exported `pps-physics-game` object:
// - `initialize()` once, after the object passed the host's checks.
// - `render(dt)` once per frame while running.
// - `pause()` / `resume()` around focus changes.
// - `dispose()` once at shutdown.

use pps_launcher_sdk::prelude::*;

const WORLD_WIDTH: f32 = 320.0;
const WORLD_HEIGHT: f32 = 240.0;
const GRAVITY: f32 = 600.0;
const RESTITUTION: f32 = 0.8;
// Longest step integrated at once; keeps balls from tunnelling through walls.
const MAX_STEP: f32 = 1.0 / 30.0;
const BALL_COUNT: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq)]
struct Ball {
    x: f32,
    y: f32,
    vx: f32,
    vy: f32,
    radius: f32,
}

impl Ball {
    fn step(&mut self, dt: f32) {
        self.vy += GRAVITY * dt;
        self.x += self.vx * dt;
        self.y += self.vy * dt;

        if self.x - self.radius < 0.0 {
            self.x = self.radius;
            self.vx = -self.vx * RESTITUTION;
        } else if self.x + self.radius > WORLD_WIDTH {
            self.x = WORLD_WIDTH - self.radius;
            self.vx = -self.vx * RESTITUTION;
        }

        if self.y + self.radius > WORLD_HEIGHT {
            self.y = WORLD_HEIGHT - self.radius;
            self.vy = -self.vy * RESTITUTION;
        } else if self.y - self.radius < 0.0 {
            self.y = self.radius;
            self.vy = -self.vy * RESTITUTION;
        }
    }

    fn energy(&self) -> f32 {
        let kinetic = 0.5 * (self.vx * self.vx + self.vy * self.vy);
        let potential = GRAVITY * (WORLD_HEIGHT - self.y);
        kinetic + potential
    }
}

struct PhysicsGame {
    balls: Vec<Ball>,
    elapsed: f32,
    frames: u64,
    paused_at: Option<u64>,
}

impl PhysicsGame {
    fn new() -> Self {
        let balls = (0..BALL_COUNT)
            .map(|i| {
                let f = i as f32;
                Ball {
                    x: 20.0 + f * 35.0,
                    y: 20.0 + (f * 13.0) % 80.0,
                    vx: 40.0 - f * 10.0,
                    vy: 0.0,
                    radius: 4.0 + (i % 3) as f32 * 2.0,
                }
            })
            .collect();

        Self {
            balls,
            elapsed: 0.0,
            frames: 0,
            paused_at: None,
        }
    }

    fn total_energy(&self) -> f32 {
        self.balls.iter().map(Ball::energy).sum()
    }
}

impl Application for PhysicsGame {
    fn initialize(&mut self) {
        system::log(&format!(
            "physics: {} balls, host abi v{}",
            self.balls.len(),
            system::host_abi_version()
        ));
    }

    fn render(&mut self, delta_seconds: f32) {
        let dt = delta_seconds.clamp(0.0, MAX_STEP);
        for ball in &mut self.balls {
            ball.step(dt);
        }

        self.elapsed += dt;
        self.frames += 1;
        if self.frames % 300 == 0 {
            system::log(&format!(
                "physics: t={:.1}s energy={:.0}",
                self.elapsed,
                self.total_energy()
            ));
        }
    }

    fn pause(&mut self) {
        self.paused_at = Some(system::millis());
    }

    fn resume(&mut self) {
        if let Some(at) = self.paused_at.take() {
            system::log(&format!(
                "physics: resumed after {}ms",
                system::millis().saturating_sub(at)
            ));
        }
    }

    fn dispose(&mut self) {
        system::log(&format!("physics: disposed after {} frames", self.frames));
        self.balls.clear();
    }
}

export_application!(PhysicsGame, PhysicsGame::new());
