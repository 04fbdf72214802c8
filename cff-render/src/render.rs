use ab_glyph::{point, Font, FontVec, Glyph, PxScale, ScaleFont};
use anyhow::{ensure, Result};
use cff_core::{LightLevels, SessionPhase, TrialResult};
use std::path::PathBuf;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, PremultipliedColorU8, Transform};

/// The original test scene was 400x400; everything scales from that.
const REFERENCE_SIZE: f32 = 400.0;
const CIRCLE_RADIUS: f32 = 80.0;
const CIRCLE_SPACING: f32 = 200.0;

const WHITE: [u8; 3] = [255, 255, 255];
const ACCENT: [u8; 3] = [90, 160, 255];

/// Draws the test screens into an RGBA frame buffer with tiny-skia.
///
/// Text goes through `ab_glyph` with a font located at runtime; when no
/// font can be found the screens degrade to shapes only.
pub struct FlickerRenderer {
    width: u32,
    height: u32,
    canvas: Pixmap,
    font: Option<FontVec>,
}

impl FlickerRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let canvas = Pixmap::new(width.max(1), height.max(1))
            .ok_or_else(|| anyhow::anyhow!("Cannot allocate {}x{} canvas", width, height))?;
        let font = load_font();
        if font.is_none() {
            eprintln!("No usable font found (set CFF_FONT); text will be skipped");
        }
        Ok(Self {
            width: width.max(1),
            height: height.max(1),
            canvas,
            font,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Some(canvas) = Pixmap::new(width.max(1), height.max(1)) {
            self.width = width.max(1);
            self.height = height.max(1);
            self.canvas = canvas;
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn scale(&self) -> f32 {
        (self.width.min(self.height) as f32) / REFERENCE_SIZE
    }

    /// Centers of the lead and trail circles.
    pub fn circle_centers(&self) -> ((f32, f32), (f32, f32)) {
        let cx = self.width as f32 / 2.0;
        let cy = self.height as f32 / 2.0;
        let half_gap = CIRCLE_SPACING * self.scale() / 2.0;
        ((cx - half_gap, cy), (cx + half_gap, cy))
    }

    /// Renders one frame of the appropriate screen for `phase` and copies
    /// it into `frame` (RGBA, row-major).
    pub fn render_frame(
        &mut self,
        phase: SessionPhase,
        levels: LightLevels,
        progress: Option<(usize, usize)>,
        results: &[TrialResult],
        median_hz: f64,
        frame: &mut [u8],
    ) -> Result<()> {
        ensure!(
            frame.len() == self.canvas.data().len(),
            "Frame buffer is {} bytes, canvas needs {}",
            frame.len(),
            self.canvas.data().len()
        );

        self.canvas.fill(Color::BLACK);

        match phase {
            SessionPhase::Idle => self.draw_start_screen(),
            SessionPhase::Armed | SessionPhase::Running => {
                self.draw_test_screen(levels, progress);
            }
            SessionPhase::InterTrial => self.draw_pause_screen(progress),
            SessionPhase::Finished => self.draw_results_screen(results, median_hz),
        }

        frame.copy_from_slice(self.canvas.data());
        Ok(())
    }

    fn draw_start_screen(&mut self) {
        let cx = self.width as f32 / 2.0;
        let cy = self.height as f32 / 2.0;
        let s = self.scale();
        self.draw_text_centered("Flashing Light Test", 36.0 * s, cx, cy - 30.0 * s, WHITE);
        self.draw_text_centered("Press SPACE to begin", 20.0 * s, cx, cy + 30.0 * s, ACCENT);
    }

    fn draw_test_screen(&mut self, levels: LightLevels, progress: Option<(usize, usize)>) {
        let (lead, trail) = self.circle_centers();
        let radius = CIRCLE_RADIUS * self.scale();
        if levels.lead {
            self.fill_circle(lead.0, lead.1, radius);
        }
        if levels.trail {
            self.fill_circle(trail.0, trail.1, radius);
        }
        self.draw_progress(progress);
        let cx = self.width as f32 / 2.0;
        let hint_y = self.height as f32 * 0.95;
        self.draw_text_centered(
            "Press SPACE when the flicker looks steady",
            16.0 * self.scale(),
            cx,
            hint_y,
            ACCENT,
        );
    }

    fn draw_pause_screen(&mut self, progress: Option<(usize, usize)>) {
        // Blank field between trials, as in the original test.
        self.draw_progress(progress);
    }

    fn draw_results_screen(&mut self, results: &[TrialResult], median_hz: f64) {
        let cx = self.width as f32 / 2.0;
        let s = self.scale();
        let mut y = self.height as f32 * 0.15;
        self.draw_text_centered("Test Completed", 32.0 * s, cx, y, WHITE);
        y += 50.0 * s;

        for result in results {
            let line = format!(
                "Trial {}: {:.2} Hz",
                result.trial_id + 1,
                result.frequency_hz
            );
            self.draw_text_centered(&line, 18.0 * s, cx, y, WHITE);
            y += 26.0 * s;
        }

        y += 30.0 * s;
        self.draw_text_centered("Median Frequency", 20.0 * s, cx, y, WHITE);
        y += 42.0 * s;
        self.draw_text_centered(&format!("{:.2} Hz", median_hz), 40.0 * s, cx, y, ACCENT);
        y += 60.0 * s;
        self.draw_text_centered("R to retry, ESC to quit", 16.0 * s, cx, y, WHITE);
    }

    fn draw_progress(&mut self, progress: Option<(usize, usize)>) {
        if let Some((current, total)) = progress {
            let cx = self.width as f32 / 2.0;
            let y = self.height as f32 * 0.08;
            let line = format!("Trial {} of {}", current, total);
            self.draw_text_centered(&line, 18.0 * self.scale(), cx, y, WHITE);
        }
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32) {
        let mut pb = PathBuilder::new();
        pb.push_circle(cx, cy, radius);
        let Some(path) = pb.finish() else {
            return;
        };
        let mut paint = Paint::default();
        paint.set_color(Color::WHITE);
        paint.anti_alias = true;
        self.canvas
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    /// Rasterizes `text` centered on `center_x` with its baseline at
    /// `baseline_y`, blending glyph coverage over the opaque canvas.
    fn draw_text_centered(
        &mut self,
        text: &str,
        size_px: f32,
        center_x: f32,
        baseline_y: f32,
        color: [u8; 3],
    ) {
        let Some(font) = self.font.as_ref() else {
            return;
        };
        let scale = PxScale::from(size_px.max(1.0));
        let scaled = font.as_scaled(scale);

        let mut pen_x = 0.0f32;
        let mut glyphs = Vec::<Glyph>::new();
        for ch in text.chars() {
            let id = font.glyph_id(ch);
            if let Some(prev) = glyphs.last() {
                pen_x += scaled.kern(prev.id, id);
            }
            glyphs.push(Glyph {
                id,
                scale,
                position: point(pen_x, 0.0),
            });
            pen_x += scaled.h_advance(id);
        }

        let origin_x = center_x - pen_x / 2.0;
        let width = self.width as usize;
        let height = self.height as usize;
        let pixels = self.canvas.pixels_mut();

        for glyph in glyphs {
            let Some(outlined) = font.outline_glyph(Glyph {
                position: point(glyph.position.x + origin_x, baseline_y),
                ..glyph
            }) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|x, y, coverage| {
                if coverage <= f32::EPSILON {
                    return;
                }
                let px = bounds.min.x as i32 + x as i32;
                let py = bounds.min.y as i32 + y as i32;
                if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                    return;
                }
                let i = py as usize * width + px as usize;
                let bg = pixels[i];
                let cov = coverage.min(1.0);
                let inv = 1.0 - cov;
                let r = (color[0] as f32 * cov + bg.red() as f32 * inv) as u8;
                let g = (color[1] as f32 * cov + bg.green() as f32 * inv) as u8;
                let b = (color[2] as f32 * cov + bg.blue() as f32 * inv) as u8;
                // Canvas is opaque, so premultiplied components stay valid.
                if let Some(blended) = PremultipliedColorU8::from_rgba(r, g, b, 255) {
                    pixels[i] = blended;
                }
            });
        }
    }
}

/// Looks for a usable TTF: `CFF_FONT` first, then common system locations.
fn load_font() -> Option<FontVec> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(path) = std::env::var("CFF_FONT") {
        candidates.push(PathBuf::from(path));
    }
    for path in [
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ] {
        candidates.push(PathBuf::from(path));
    }
    for candidate in candidates {
        if let Ok(data) = std::fs::read(&candidate) {
            if let Ok(font) = FontVec::try_from_vec(data) {
                return Some(font);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_at(frame: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * width + x) * 4) as usize;
        [frame[i], frame[i + 1], frame[i + 2], frame[i + 3]]
    }

    #[test]
    fn lit_circle_is_white_dark_circle_is_black() {
        let mut renderer = FlickerRenderer::new(200, 200).unwrap();
        let mut frame = vec![0u8; 200 * 200 * 4];
        let levels = LightLevels {
            lead: true,
            trail: false,
        };
        renderer
            .render_frame(
                SessionPhase::Running,
                levels,
                Some((1, 7)),
                &[],
                0.0,
                &mut frame,
            )
            .unwrap();

        let ((lx, ly), (tx, ty)) = renderer.circle_centers();
        let lead = rgba_at(&frame, 200, lx as u32, ly as u32);
        let trail = rgba_at(&frame, 200, tx as u32, ty as u32);
        assert_eq!(&lead[..3], &[255, 255, 255]);
        assert_eq!(&trail[..3], &[0, 0, 0]);
    }

    #[test]
    fn both_circles_lit_at_rest() {
        let mut renderer = FlickerRenderer::new(200, 200).unwrap();
        let mut frame = vec![0u8; 200 * 200 * 4];
        renderer
            .render_frame(
                SessionPhase::Armed,
                LightLevels::BOTH_LIT,
                Some((1, 7)),
                &[],
                0.0,
                &mut frame,
            )
            .unwrap();
        let ((lx, ly), (tx, ty)) = renderer.circle_centers();
        assert_eq!(&rgba_at(&frame, 200, lx as u32, ly as u32)[..3], &[255, 255, 255]);
        assert_eq!(&rgba_at(&frame, 200, tx as u32, ty as u32)[..3], &[255, 255, 255]);
    }

    #[test]
    fn all_screens_render_without_panic() {
        let mut renderer = FlickerRenderer::new(320, 240).unwrap();
        let mut frame = vec![0u8; 320 * 240 * 4];
        let results = vec![TrialResult {
            trial_id: 0,
            frequency_hz: 42.5,
            timestamp_ns: 1,
        }];
        for phase in [
            SessionPhase::Idle,
            SessionPhase::Armed,
            SessionPhase::Running,
            SessionPhase::InterTrial,
            SessionPhase::Finished,
        ] {
            renderer
                .render_frame(
                    phase,
                    LightLevels::BOTH_LIT,
                    None,
                    &results,
                    42.5,
                    &mut frame,
                )
                .unwrap();
        }
    }

    #[test]
    fn mismatched_frame_buffer_is_an_error() {
        let mut renderer = FlickerRenderer::new(100, 100).unwrap();
        let mut frame = vec![0u8; 16];
        let result = renderer.render_frame(
            SessionPhase::Idle,
            LightLevels::BOTH_LIT,
            None,
            &[],
            0.0,
            &mut frame,
        );
        assert!(result.is_err());
    }
}
