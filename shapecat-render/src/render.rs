use ab_glyph::FontRef;
use anyhow::{anyhow, bail, Context, Result};
use bytemuck::{cast_slice, cast_slice_mut};
use shapecat_cache::{get_text, intern_text, Atom};
use shapecat_core::{Phase, Shape, Stimulus, TaskPhase, TrialState};
use shapecat_timing::{FrameTimingStats, HighPrecisionTimer, Timer};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};

use crate::text::{self, render_text_block, render_text_pixmap};

// Sizes in screen-height units
const SHAPE_SIZE: f32 = 0.2;
const FIXATION_SIZE: f32 = 0.1;
const TEXT_HEIGHT: f32 = 0.05;
const CONSENT_TEXT_HEIGHT: f32 = 0.03;
const CONSENT_WRAP: f32 = 1.2;
const SCREEN_WRAP: f32 = 1.5;
const SLIDER_WIDTH: f32 = 1.0;
const SLIDER_OFFSET: f32 = 0.2;

const WHITE: [u8; 4] = [255, 255, 255, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const RED: [u8; 4] = [255, 0, 0, 255];

#[repr(usize)]
#[derive(Debug, Clone, Copy)]
enum CacheIndex {
    // Screen texts (0-5)
    Consent = 0,
    Instructions = 1,
    TrainingFailed = 2,
    VolumeAdjust = 3,
    TestingInstructions = 4,
    Complete = 5,

    // Feedback (6-7)
    Correct = 6,
    Incorrect = 7,

    // Shapes, offset by Stimulus::cache_id (8-9)
    Shapes = 8,

    FixationCross = 10,

    // Volume slider (11-12)
    SliderTrack = 11,
    SliderKnob = 12,
}

impl CacheIndex {
    const STATIC_COUNT: usize = 13;

    fn screen(phase: TaskPhase) -> Option<Self> {
        match phase {
            TaskPhase::Consent => Some(Self::Consent),
            TaskPhase::Instructions => Some(Self::Instructions),
            TaskPhase::TrainingFailed => Some(Self::TrainingFailed),
            TaskPhase::VolumeAdjust => Some(Self::VolumeAdjust),
            TaskPhase::TestingInstructions => Some(Self::TestingInstructions),
            TaskPhase::Complete => Some(Self::Complete),
            TaskPhase::Training | TaskPhase::Testing => None,
        }
    }
}

pub(crate) fn load_font() -> Result<FontRef<'static>> {
    FontRef::try_from_slice(include_bytes!("../../assets/DejaVuSans.ttf"))
        .map_err(|e| anyhow!("failed to load font: {e}"))
}

/// What the experiment wants on screen this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenView {
    pub phase: TaskPhase,
    pub trial_state: Option<TrialState>,
    pub stimulus: Option<Shape>,
    pub feedback: Option<bool>,
    pub volume: f32,
}

impl ScreenView {
    pub fn screen(phase: TaskPhase) -> Self {
        Self {
            phase,
            trial_state: None,
            stimulus: None,
            feedback: None,
            volume: 0.0,
        }
    }
}

struct TextCache {
    font: FontRef<'static>,
    size_px: f32,
    map: HashMap<Atom, Arc<Pixmap>>,
}

impl TextCache {
    fn new(font: FontRef<'static>, size_px: f32) -> Self {
        Self {
            font,
            size_px,
            map: HashMap::new(),
        }
    }

    fn get_or_render(&mut self, atom: Atom) -> Result<Arc<Pixmap>> {
        if let Some(p) = self.map.get(&atom) {
            return Ok(Arc::clone(p));
        }
        let pm = Arc::new(render_text_pixmap(
            atom.as_ref(),
            self.size_px,
            &self.font,
            Color::WHITE,
        )?);
        self.map.insert(atom, Arc::clone(&pm));
        Ok(pm)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameStats {
    pub clear: Duration,
    pub phase: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub dirty_count: usize,
}

pub trait Renderer {
    fn clear_dirty(&mut self, dirty: &[Rect]);
    fn blit_cached(&mut self, index: usize, pos: (f32, f32));
    fn blit_text_by_intern_id(&mut self, intern_id: usize, pos: (f32, f32)) -> Result<()>;
}

pub trait PhaseRenderer: Renderer {
    fn render_phase(&mut self, view: &ScreenView) -> Result<()>;
}

pub struct SkiaRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),

    font: FontRef<'static>,

    static_cache: Vec<Pixmap>,
    text_cache: TextCache,
    volume_label_interns: Vec<usize>,

    canvas: Pixmap,
    dirty_regions: Vec<Rect>,
    first_frame: bool,

    component_timers: HashMap<&'static str, HighPrecisionTimer>,
    clear_buffer: Vec<u8>,
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let font = load_font()?;

        // One label per whole percent, interned once for the process
        let volume_label_interns = (0..=100)
            .map(|pct| intern_text(&format!("Volume: {pct}%")))
            .collect();

        let mut renderer = SkiaRenderer {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            font: font.clone(),
            static_cache: Vec::with_capacity(CacheIndex::STATIC_COUNT),
            text_cache: TextCache::new(font, 1.0),
            volume_label_interns,
            canvas: opaque_canvas(width, height)?,
            dirty_regions: Vec::with_capacity(16),
            first_frame: true,
            component_timers: ["phase", "clear", "copy", "total"]
                .iter()
                .map(|&k| (k, HighPrecisionTimer::new()))
                .collect(),
            clear_buffer: clear_buffer(width, height),
        };

        renderer.init_cache()?;
        Ok(renderer)
    }

    /// Resizes the canvas and re-rasterizes everything sized from the height
    pub fn resize(&mut self, new_width: u32, new_height: u32) -> Result<()> {
        self.width = new_width;
        self.height = new_height;
        self.center = (new_width as f32 / 2.0, new_height as f32 / 2.0);
        self.canvas = opaque_canvas(new_width, new_height)?;
        self.clear_buffer = clear_buffer(new_width, new_height);
        self.dirty_regions.clear();
        self.first_frame = true;
        self.init_cache()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn px(&self, units: f32) -> f32 {
        units * self.height as f32
    }

    fn init_cache(&mut self) -> Result<()> {
        self.static_cache = (0..CacheIndex::STATIC_COUNT)
            .map(|_| Pixmap::new(1, 1).context("placeholder pixmap"))
            .collect::<Result<_>>()?;
        self.text_cache = TextCache::new(self.font.clone(), self.px(TEXT_HEIGHT));

        self.cache_screen_text()?;
        self.cache_feedback()?;
        self.cache_stimuli()?;
        self.cache_fixation()?;
        self.cache_slider()
    }

    fn cache_screen_text(&mut self) -> Result<()> {
        let screens = [
            TaskPhase::Consent,
            TaskPhase::Instructions,
            TaskPhase::TrainingFailed,
            TaskPhase::VolumeAdjust,
            TaskPhase::TestingInstructions,
            TaskPhase::Complete,
        ];

        for phase in screens {
            let (Some(index), Some(body)) = (CacheIndex::screen(phase), text::screen_text(phase))
            else {
                continue;
            };
            let (size, wrap) = if phase == TaskPhase::Consent {
                (self.px(CONSENT_TEXT_HEIGHT), self.px(CONSENT_WRAP))
            } else {
                (self.px(TEXT_HEIGHT), self.px(SCREEN_WRAP))
            };
            self.static_cache[index as usize] =
                render_text_block(body, size, &self.font, Color::WHITE, Some(wrap))?;
        }
        Ok(())
    }

    fn cache_feedback(&mut self) -> Result<()> {
        let labels = [
            (CacheIndex::Correct, text::CORRECT, GREEN),
            (CacheIndex::Incorrect, text::INCORRECT, RED),
        ];
        for (index, label, [r, g, b, a]) in labels {
            self.static_cache[index as usize] = render_text_pixmap(
                label,
                self.px(TEXT_HEIGHT),
                &self.font,
                Color::from_rgba8(r, g, b, a),
            )?;
        }
        Ok(())
    }

    fn cache_stimuli(&mut self) -> Result<()> {
        for shape in [Shape::Square, Shape::Circle] {
            let pixmap = self.render_stimulus_to_pixmap(shape)?;
            self.static_cache[CacheIndex::Shapes as usize + shape.cache_id()] = pixmap;
        }
        Ok(())
    }

    fn cache_fixation(&mut self) -> Result<()> {
        let size = self.px(FIXATION_SIZE).round().max(3.0);
        let bar = (size / 12.0).round().max(2.0);
        let mut pm = Pixmap::new(size as u32, size as u32).context("fixation pixmap")?;

        let mut paint = Paint::default();
        paint.anti_alias = false;
        paint.set_color(Color::WHITE);

        let bars = [
            Rect::from_xywh(0.0, (size - bar) * 0.5, size, bar),
            Rect::from_xywh((size - bar) * 0.5, 0.0, bar, size),
        ];
        for rect in bars.into_iter().flatten() {
            pm.fill_rect(rect, &paint, Transform::identity(), None);
        }

        self.static_cache[CacheIndex::FixationCross as usize] = pm;
        Ok(())
    }

    fn cache_slider(&mut self) -> Result<()> {
        let mut paint = Paint::default();
        paint.anti_alias = false;

        let track_w = self.px(SLIDER_WIDTH).round().max(1.0);
        let track_h = (self.px(0.005)).round().max(2.0);
        let mut track = Pixmap::new(track_w as u32, track_h as u32).context("slider track")?;
        paint.set_color(Color::from_rgba8(128, 128, 128, 255));
        if let Some(r) = Rect::from_xywh(0.0, 0.0, track_w, track_h) {
            track.fill_rect(r, &paint, Transform::identity(), None);
        }

        let knob_w = self.px(0.015).round().max(2.0);
        let knob_h = self.px(0.06).round().max(4.0);
        let mut knob = Pixmap::new(knob_w as u32, knob_h as u32).context("slider knob")?;
        paint.set_color(Color::WHITE);
        if let Some(r) = Rect::from_xywh(0.0, 0.0, knob_w, knob_h) {
            knob.fill_rect(r, &paint, Transform::identity(), None);
        }

        self.static_cache[CacheIndex::SliderTrack as usize] = track;
        self.static_cache[CacheIndex::SliderKnob as usize] = knob;
        Ok(())
    }

    fn render_stimulus_to_pixmap(&self, shape: Shape) -> Result<Pixmap> {
        let side = self.px(SHAPE_SIZE).round().max(2.0);
        let mut pixmap = Pixmap::new(side as u32, side as u32).context("stimulus pixmap")?;
        let mut paint = Paint::default();
        paint.set_color(Color::WHITE);

        match shape {
            Shape::Square => {
                paint.anti_alias = false;
                let rect = Rect::from_xywh(0.0, 0.0, side, side).context("square rect")?;
                pixmap.fill_rect(rect, &paint, Transform::identity(), None);
            }
            Shape::Circle => {
                let r = side / 2.0;
                let path = PathBuilder::from_circle(r, r, r).context("circle path")?;
                pixmap.fill_path(
                    &path,
                    &paint,
                    FillRule::Winding,
                    Transform::identity(),
                    None,
                );
            }
        }

        Ok(pixmap)
    }

    fn clear_dirty(&mut self, dirty: &[Rect]) {
        let stride = self.width as usize * 4;
        let (width, height) = (self.width, self.height);
        let canvas_data = self.canvas.data_mut();

        for rect in dirty {
            let Some((x0, y0, x1, y1)) = clip(rect, width, height) else {
                continue;
            };
            let row_len = (x1 - x0) * 4;
            for y in y0..y1 {
                let off = y * stride + x0 * 4;
                canvas_data[off..off + row_len]
                    .copy_from_slice(&self.clear_buffer[off..off + row_len]);
            }
        }
    }

    fn copy_dirty_region(&self, dirty: &Rect, frame_buffer: &mut [u8]) {
        let Some((x0, y0, x1, y1)) = clip(dirty, self.width, self.height) else {
            return;
        };
        let bytes = (x1 - x0) * 4;
        let row_bytes = self.width as usize * 4;
        let canvas_data = self.canvas.data();

        for row in y0..y1 {
            let off = row * row_bytes + x0 * 4;
            frame_buffer[off..off + bytes].copy_from_slice(&canvas_data[off..off + bytes]);
        }
    }

    fn coalesce_dirty(rects: &mut Vec<Rect>) {
        rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
        let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
        for r in rects.drain(..) {
            if let Some(last) = out.last_mut() {
                let same_row =
                    (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
                let touching = r.x() <= last.x() + last.width() + 1.0;
                if same_row && touching {
                    let nx = last.x().min(r.x());
                    let nx2 = (last.x() + last.width()).max(r.x() + r.width());
                    if let Some(merged) = Rect::from_xywh(nx, last.y(), nx2 - nx, last.height()) {
                        *last = merged;
                        continue;
                    }
                }
            }
            out.push(r);
        }
        *rects = out;
    }

    /// Draws `view` on the offscreen canvas and copies changed regions into
    /// `frame_buffer`, an RGBA8 buffer of exactly `width * height * 4` bytes.
    pub fn render_frame(
        &mut self,
        view: &ScreenView,
        frame_buffer: &mut [u8],
        timer: &mut HighPrecisionTimer,
    ) -> Result<FrameStats> {
        if frame_buffer.len() != self.clear_buffer.len() {
            bail!(
                "frame buffer is {} bytes, expected {} for {}x{}",
                frame_buffer.len(),
                self.clear_buffer.len(),
                self.width,
                self.height
            );
        }

        if self.first_frame {
            self.first_frame = false;
            self.canvas.fill(Color::BLACK);
            frame_buffer.copy_from_slice(&self.clear_buffer);
            self.dirty_regions.clear();
        }

        let old_dirty = std::mem::take(&mut self.dirty_regions);

        let t_clear = {
            let t = timer.now();
            SkiaRenderer::clear_dirty(self, &old_dirty);
            timer.elapsed(t)
        };

        let t_phase = {
            let t = timer.now();
            self.render_phase(view)?;
            timer.elapsed(t)
        };

        let mut present_rects = old_dirty;
        present_rects.extend_from_slice(&self.dirty_regions);
        SkiaRenderer::coalesce_dirty(&mut present_rects);

        let t_copy = {
            let t = timer.now();
            for rect in &present_rects {
                self.copy_dirty_region(rect, frame_buffer);
            }
            timer.elapsed(t)
        };

        let total = t_clear + t_phase + t_copy;
        for (name, d) in [
            ("phase", t_phase),
            ("clear", t_clear),
            ("copy", t_copy),
            ("total", total),
        ] {
            if let Some(component) = self.component_timers.get_mut(name) {
                component.record_frame(d);
            }
        }
        timer.record_frame(total);

        Ok(FrameStats {
            clear: t_clear,
            phase: t_phase,
            copy: t_copy,
            total,
            dirty_count: self.dirty_regions.len(),
        })
    }

    /// Timing statistics of one render stage: phase, clear, copy or total
    pub fn component_stats(&self, name: &str) -> Option<FrameTimingStats> {
        self.component_timers.get(name).map(|t| t.frame_stats())
    }

    fn blit_pixmap(canvas: &mut Pixmap, src: &Pixmap, pos: (f32, f32)) -> Option<Rect> {
        let (w, h) = (src.width() as i32, src.height() as i32);
        let (cw, ch) = (canvas.width() as i32, canvas.height() as i32);

        let x0 = (pos.0 - w as f32 * 0.5).floor() as i32;
        let y0 = (pos.1 - h as f32 * 0.5).floor() as i32;

        let dst_x = x0.max(0);
        let dst_y = y0.max(0);
        let dst_x_end = (x0 + w).min(cw);
        let dst_y_end = (y0 + h).min(ch);
        if dst_x_end <= dst_x || dst_y_end <= dst_y {
            return None;
        }

        let src_x = (dst_x - x0) as usize;
        let src_y = (dst_y - y0) as usize;
        let copy_w = (dst_x_end - dst_x) as usize;
        let copy_h = (dst_y_end - dst_y) as usize;
        let (dst_x, dst_y) = (dst_x as usize, dst_y as usize);
        let src_stride = w as usize;
        let dst_stride = cw as usize;

        let src_px: &[[u8; 4]] = cast_slice(src.data());
        let dst_px: &mut [[u8; 4]] = cast_slice_mut(canvas.data_mut());

        let fully_opaque = (0..copy_h).all(|row| {
            let start = (src_y + row) * src_stride + src_x;
            src_px[start..start + copy_w].iter().all(|p| p[3] == 255)
        });

        for row in 0..copy_h {
            let s = (src_y + row) * src_stride + src_x;
            let d = (dst_y + row) * dst_stride + dst_x;
            let src_row = &src_px[s..s + copy_w];
            let dst_row = &mut dst_px[d..d + copy_w];
            if fully_opaque {
                dst_row.copy_from_slice(src_row);
            } else {
                for (dst, src) in dst_row.iter_mut().zip(src_row) {
                    blend_over(dst, *src);
                }
            }
        }

        Rect::from_xywh(dst_x as f32, dst_y as f32, copy_w as f32, copy_h as f32)
    }

    fn render_trial(&mut self, view: &ScreenView) {
        let Some(state) = view.trial_state else {
            return;
        };
        match state {
            TrialState::Fixation => {
                self.blit_cached(CacheIndex::FixationCross as usize, self.center);
            }
            TrialState::Response => {
                if let Some(shape) = view.stimulus {
                    self.blit_cached(CacheIndex::Shapes as usize + shape.cache_id(), self.center);
                }
            }
            TrialState::Feedback => {
                let index = match view.feedback {
                    Some(true) => CacheIndex::Correct,
                    Some(false) => CacheIndex::Incorrect,
                    None => return,
                };
                self.blit_cached(index as usize, self.center);
            }
            TrialState::Complete => {
                // Blank between trials
            }
        }
    }

    fn render_volume(&mut self, volume: f32) -> Result<()> {
        let text_pos = (self.center.0, self.center.1 - self.px(SLIDER_OFFSET));
        let slider_y = self.center.1 + self.px(SLIDER_OFFSET);
        let track_w = self.static_cache[CacheIndex::SliderTrack as usize].width() as f32;
        let volume = volume.clamp(0.0, 1.0);
        let knob_x = self.center.0 - track_w / 2.0 + volume * track_w;

        self.blit_cached(CacheIndex::VolumeAdjust as usize, text_pos);
        self.blit_cached(CacheIndex::SliderTrack as usize, (self.center.0, slider_y));
        self.blit_cached(CacheIndex::SliderKnob as usize, (knob_x, slider_y));

        let pct = (volume * 100.0).round() as usize;
        if let Some(&intern_id) = self.volume_label_interns.get(pct) {
            let label_pos = (self.center.0, slider_y + self.px(0.08));
            self.blit_text_by_intern_id(intern_id, label_pos)?;
        }
        Ok(())
    }
}

impl Renderer for SkiaRenderer {
    fn clear_dirty(&mut self, dirty: &[Rect]) {
        SkiaRenderer::clear_dirty(self, dirty);
    }

    fn blit_cached(&mut self, index: usize, pos: (f32, f32)) {
        let Some(pixmap) = self.static_cache.get(index) else {
            return;
        };
        if let Some(rect) = Self::blit_pixmap(&mut self.canvas, pixmap, pos) {
            self.dirty_regions.push(rect);
        }
    }

    fn blit_text_by_intern_id(&mut self, intern_id: usize, pos: (f32, f32)) -> Result<()> {
        let Some(atom) = get_text(intern_id) else {
            return Ok(());
        };
        let pm = self.text_cache.get_or_render(atom)?;
        if let Some(rect) = Self::blit_pixmap(&mut self.canvas, &pm, pos) {
            self.dirty_regions.push(rect);
        }
        Ok(())
    }
}

impl PhaseRenderer for SkiaRenderer {
    fn render_phase(&mut self, view: &ScreenView) -> Result<()> {
        match view.phase {
            p if p.is_block() => self.render_trial(view),
            p if p.is_volume_adjust() => self.render_volume(view.volume)?,
            p => {
                if let Some(index) = CacheIndex::screen(p) {
                    self.blit_cached(index as usize, self.center);
                }
            }
        }
        Ok(())
    }
}

fn opaque_canvas(width: u32, height: u32) -> Result<Pixmap> {
    let mut canvas = Pixmap::new(width, height)
        .with_context(|| format!("cannot create {width}x{height} canvas"))?;
    canvas.fill(Color::BLACK);
    Ok(canvas)
}

fn clear_buffer(width: u32, height: u32) -> Vec<u8> {
    [0u8, 0, 0, 255]
        .into_iter()
        .cycle()
        .take(width as usize * height as usize * 4)
        .collect()
}

/// Pixel bounds of `rect` inside the canvas, None when empty
fn clip(rect: &Rect, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
    let x0 = rect.x().floor().clamp(0.0, width as f32) as usize;
    let y0 = rect.y().floor().clamp(0.0, height as f32) as usize;
    let x1 = (rect.x() + rect.width()).ceil().min(width as f32) as usize;
    let y1 = (rect.y() + rect.height()).ceil().min(height as f32) as usize;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

/// Premultiplied source-over
fn blend_over(dst: &mut [u8; 4], src: [u8; 4]) {
    let inv = 255 - src[3] as u32;
    for c in 0..4 {
        dst[c] = (src[c] as u32 + (dst[c] as u32 * inv + 127) / 255).min(255) as u8;
    }
}
