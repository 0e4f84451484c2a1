use std::path::Path;

use anyhow::Result;
use glam::{Mat4, Quat, Vec3};

use atelier_engine::entity::{Entity, EntityDesc};
use atelier_engine::input::MouseButton;
use atelier_engine::resources::{PixelOrder, PixelSurface, RenderContext};
use atelier_engine::script::{Script, ScriptCtx};

const FOV_Y: f32 = std::f32::consts::FRAC_PI_4;

/// Projection for wgpu's [0, 1] clip depth.
fn projection(ctx: &ScriptCtx<'_>) -> Mat4 {
    Mat4::perspective_rh(FOV_Y, ctx.aspect_ratio(), 0.1, 100.0)
}

// ── playground ───────────────────────────────────────────────────────────

pub struct Playground {
    surface: Entity,
    clicks: [[f32; 2]; 2],
    /// Which click slot the next left click fills.
    turn: usize,
}

/// Full-screen fragment shader fed with time, resolution and mouse input.
/// Left clicks alternate between two stored points.
pub fn playground(ctx: &mut RenderContext, window_size: (u32, u32)) -> Result<Script<Playground>> {
    let surface = Entity::create(ctx, EntityDesc::surface("Background", "Playground").with_textures(false))?;
    log::debug!("playground created for a {}x{} window", window_size.0, window_size.1);

    let state = Playground { surface, clicks: [[0.0; 2]; 2], turn: 0 };
    Ok(Script::new("playground", state)
        .on("a_track_clicks", |s: &mut Playground, ctx| {
            if ctx.input_frame.button_pressed(MouseButton::Left) {
                let (x, y) = ctx.input.pointer_or_origin();
                s.clicks[s.turn] = [x, y];
                s.turn = 1 - s.turn;
            }
            Ok(())
        })
        .on("b_render", |s, ctx| {
            let (w, h) = ctx.window_size();
            let render = &mut *ctx.render;
            s.surface.set_uniform(render, "u_resolution", (w as f32, h as f32));
            s.surface.set_uniform(render, "u_mouse", ctx.input.pointer_or_origin());
            s.surface.set_uniform(render, "u_mouse_click1", s.clicks[0]);
            s.surface.set_uniform(render, "u_mouse_click2", s.clicks[1]);
            s.surface.set_uniform(render, "u_time", ctx.time.elapsed);
            Ok(s.surface.render(render)?)
        })
        .on_reload(|s, ctx| {
            s.surface.reload_shader(ctx, None, None, &[])?;
            Ok(())
        }))
}

// ── cube ─────────────────────────────────────────────────────────────────

pub struct Cube {
    entity: Entity,
}

const CHECKER_SIZE: u32 = 64;

/// Two-tone checkerboard, 8 cells across.
fn checker_pixels() -> Vec<u8> {
    let cell = CHECKER_SIZE / 8;
    (0..CHECKER_SIZE * CHECKER_SIZE)
        .flat_map(|i| {
            let (x, y) = (i % CHECKER_SIZE, i / CHECKER_SIZE);
            if (x / cell + y / cell) % 2 == 0 {
                [235, 225, 200, 255]
            } else {
                [60, 70, 110, 255]
            }
        })
        .collect()
}

/// A rotating cube textured with a generated checkerboard.
pub fn cube(ctx: &mut RenderContext) -> Result<Script<Cube>> {
    let entity = Entity::create(ctx, EntityDesc::cube("Cube", "Cube"))?;

    Ok(Script::new("cube", Cube { entity })
        .once("0_texture", |s: &mut Cube, ctx| {
            let pixels = checker_pixels();
            let surface = PixelSurface {
                width: CHECKER_SIZE,
                height: CHECKER_SIZE,
                pixels: &pixels,
                order: PixelOrder::Rgba,
            };
            s.entity.attach_surface_texture(ctx.render, "u_texture", &surface)?;
            s.entity.set_uniform(ctx.render, "u_tint", (1.0f32, 1.0f32, 1.0f32, 1.0f32));
            Ok(())
        })
        .on("render", |s, ctx| {
            let t = ctx.time.elapsed;
            let model = Mat4::from_quat(Quat::from_euler(glam::EulerRot::YXZ, t * 0.7, t * 0.4, 0.0))
                * Mat4::from_scale(Vec3::splat(0.6));
            let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
            let mvp = projection(ctx) * view * model;

            s.entity.set_matrix_uniform(ctx.render, "u_mvp", &mvp.to_cols_array());
            Ok(s.entity.render(ctx.render)?)
        })
        .on_reload(|s, ctx| {
            s.entity.reload_shader(ctx, None, None, &["u_texture"])?;
            s.entity.set_uniform(ctx, "u_tint", (1.0f32, 1.0f32, 1.0f32, 1.0f32));
            Ok(())
        }))
}

// ── skybox ───────────────────────────────────────────────────────────────

pub struct Skybox {
    entity: Entity,
}

/// Cubemap background loaded from `{right,left,top,bottom,front,back}.png`
/// under `dir`, viewed by a slowly orbiting camera.
pub fn skybox(ctx: &mut RenderContext, dir: &Path) -> Result<Script<Skybox>> {
    let mut entity = Entity::create(ctx, EntityDesc::skybox("Skybox", "Skybox"))?;
    entity.attach_cube_texture(ctx, "u_skybox", dir, "png")?;

    Ok(Script::new("skybox", Skybox { entity })
        .on("render", |s: &mut Skybox, ctx| {
            let yaw = ctx.time.elapsed * 0.1;
            let forward = Vec3::new(yaw.sin(), 0.0, -yaw.cos());
            let view = Mat4::look_at_rh(Vec3::ZERO, forward, Vec3::Y);
            let inv_proj_view = (projection(ctx) * view).inverse();

            s.entity.set_matrix_uniform(ctx.render, "u_invProjView", &inv_proj_view.to_cols_array());
            Ok(s.entity.render(ctx.render)?)
        })
        .on_reload(|s, ctx| {
            s.entity.reload_shader(ctx, None, None, &["u_skybox"])?;
            Ok(())
        }))
}
