use crate::layout::StimulusLayout;
use anyhow::{Context, Result, bail};
use bytemuck::{cast_slice, cast_slice_mut};
use ssvep_core::{Renderer, SinkError, VisualState};
use ssvep_timing::{HighPrecisionTimer, TickStats, Timer};
use std::collections::HashMap;
use std::time::Duration;
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Rect, Transform};

#[repr(usize)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheIndex {
    SquareLit = 0,
    SquareDark = 1,
    Fixation = 2,
    Target = 3,
}

impl CacheIndex {
    const COUNT: usize = 4;
}

const BLACK: [u8; 4] = [0, 0, 0, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];
const RED: [u8; 4] = [255, 0, 0, 255];

#[derive(Debug, Clone, Copy, Default)]
pub struct FrameStats {
    pub clear: Duration,
    pub draw: Duration,
    pub copy: Duration,
    pub total: Duration,
    pub dirty_count: usize,
}

/// Software stimulus renderer.
///
/// Shapes are rasterised once into cached pixmaps and blitted onto an opaque
/// offscreen canvas. Only the regions touched since the last present are
/// copied to the visible frame buffer.
pub struct SkiaRenderer {
    width: u32,
    height: u32,
    center: (f32, f32),
    layout: StimulusLayout,

    static_cache: Vec<Pixmap>,

    canvas: Pixmap,
    // regions drawn by the last `draw`
    dirty_regions: Vec<Rect>,
    // regions changed on the canvas since the last `present`
    pending: Vec<Rect>,
    first_frame: bool,
    last_draw: (Duration, Duration),

    clock: HighPrecisionTimer,
    component_timers: HashMap<&'static str, HighPrecisionTimer>,
    clear_buffer: Vec<u8>,
}

fn opaque_canvas(width: u32, height: u32) -> Result<(Pixmap, Vec<u8>)> {
    let mut canvas = Pixmap::new(width, height)
        .with_context(|| format!("cannot allocate a {width}x{height} canvas"))?;
    canvas.fill(Color::from_rgba8(0, 0, 0, 255));
    let clear_buffer = canvas.data().to_vec();
    Ok((canvas, clear_buffer))
}

fn solid_square(side: u32, rgba: [u8; 4]) -> Result<Pixmap> {
    let mut pm = Pixmap::new(side, side).with_context(|| format!("cannot allocate a {side}px square"))?;
    pm.fill(Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]));
    Ok(pm)
}

fn solid_circle(diameter: u32, rgba: [u8; 4]) -> Result<Pixmap> {
    let mut pm = Pixmap::new(diameter, diameter)
        .with_context(|| format!("cannot allocate a {diameter}px circle"))?;
    let r = diameter as f32 * 0.5;
    let path = PathBuilder::from_circle(r, r, r).context("degenerate fixation circle")?;
    let mut paint = Paint::default();
    paint.anti_alias = false;
    paint.set_color(Color::from_rgba8(rgba[0], rgba[1], rgba[2], rgba[3]));
    pm.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    Ok(pm)
}

fn pixel_bounds(rect: &Rect, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
    let x0 = rect.x().floor().max(0.0).min(width as f32) as usize;
    let y0 = rect.y().floor().max(0.0).min(height as f32) as usize;
    let x1 = (rect.x() + rect.width()).ceil().min(width as f32) as usize;
    let y1 = (rect.y() + rect.height()).ceil().min(height as f32) as usize;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

impl SkiaRenderer {
    pub fn new(width: u32, height: u32, layout: StimulusLayout) -> Result<Self> {
        let (canvas, clear_buffer) = opaque_canvas(width, height)?;
        let mut renderer = SkiaRenderer {
            width,
            height,
            center: (width as f32 / 2.0, height as f32 / 2.0),
            layout,
            static_cache: Vec::with_capacity(CacheIndex::COUNT),
            canvas,
            dirty_regions: Vec::with_capacity(8),
            pending: Vec::with_capacity(16),
            first_frame: true,
            last_draw: (Duration::ZERO, Duration::ZERO),
            clock: HighPrecisionTimer::new(),
            component_timers: ["draw", "clear", "copy"]
                .iter()
                .map(|&k| (k, HighPrecisionTimer::new()))
                .collect(),
            clear_buffer,
        };
        renderer.init_cache()?;
        Ok(renderer)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn layout(&self) -> StimulusLayout {
        self.layout
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) -> Result<()> {
        let (canvas, clear_buffer) = opaque_canvas(new_width, new_height)?;
        self.width = new_width;
        self.height = new_height;
        self.center = (new_width as f32 / 2.0, new_height as f32 / 2.0);
        self.canvas = canvas;
        self.clear_buffer = clear_buffer;
        self.dirty_regions.clear();
        self.pending.clear();
        self.first_frame = true;
        // shape sizes follow the surface width
        self.init_cache()
    }

    fn init_cache(&mut self) -> Result<()> {
        let side = self.layout.square_side(self.width);
        let cache = [
            (CacheIndex::SquareLit, solid_square(side, WHITE)?),
            (CacheIndex::SquareDark, solid_square(side, BLACK)?),
            (
                CacheIndex::Fixation,
                solid_circle(self.layout.fixation_diameter(self.width), RED)?,
            ),
            (
                CacheIndex::Target,
                solid_square(self.layout.target_side(self.width), RED)?,
            ),
        ];
        self.static_cache.clear();
        for (index, pixmap) in cache {
            debug_assert_eq!(index as usize, self.static_cache.len());
            self.static_cache.push(pixmap);
        }
        Ok(())
    }

    fn clear_dirty(&mut self, dirty: &[Rect]) {
        let stride = self.width as usize * 4;
        let canvas_data = self.canvas.data_mut();

        for rect in dirty {
            let Some((x0, y0, x1, y1)) = pixel_bounds(rect, self.width, self.height) else {
                continue;
            };
            let row_len = (x1 - x0) * 4;
            for y in y0..y1 {
                let off = y * stride + x0 * 4;
                canvas_data[off..off + row_len].copy_from_slice(&self.clear_buffer[off..off + row_len]);
            }
        }
    }

    fn copy_dirty_region(&self, dirty: &Rect, frame_buffer: &mut [u8]) {
        let Some((x0, y0, x1, y1)) = pixel_bounds(dirty, self.width, self.height) else {
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

    /// Merges rects on the same row band that touch horizontally.
    fn coalesce_dirty(rects: &mut Vec<Rect>) {
        rects.sort_by(|a, b| a.y().total_cmp(&b.y()).then(a.x().total_cmp(&b.x())));
        let mut out: Vec<Rect> = Vec::with_capacity(rects.len());
        for r in rects.drain(..) {
            if let Some(last) = out.last_mut() {
                let same_row = (r.y() - last.y()).abs() < 1.0 && (r.height() - last.height()).abs() < 1.0;
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

    /// Blits a cached shape centered on `pos`, clipped to the canvas.
    pub fn blit_cached(&mut self, index: CacheIndex, pos: (f32, f32)) {
        let Some(pixmap) = self.static_cache.get(index as usize) else {
            return;
        };
        let (w, h) = (pixmap.width() as i32, pixmap.height() as i32);
        let (cw, ch) = (self.canvas.width() as i32, self.canvas.height() as i32);

        let x0 = (pos.0 - w as f32 * 0.5).floor() as i32;
        let y0 = (pos.1 - h as f32 * 0.5).floor() as i32;
        let dst_x = x0.max(0);
        let dst_y = y0.max(0);
        let copy_w = (x0 + w).min(cw) - dst_x;
        let copy_h = (y0 + h).min(ch) - dst_y;
        if copy_w <= 0 || copy_h <= 0 {
            return;
        }
        let (src_x, src_y) = ((dst_x - x0) as usize, (dst_y - y0) as usize);
        let (dst_x, dst_y) = (dst_x as usize, dst_y as usize);
        let (copy_w, copy_h) = (copy_w as usize, copy_h as usize);
        let (src_stride, dst_stride) = (w as usize, cw as usize);

        let src: &[u32] = cast_slice(pixmap.data());
        let dst: &mut [u32] = cast_slice_mut(self.canvas.data_mut());

        let fully_opaque = (0..copy_h).all(|row| {
            let start = (src_y + row) * src_stride + src_x;
            src[start..start + copy_w].iter().all(|&p| p >> 24 == 0xFF)
        });

        for row in 0..copy_h {
            let s0 = (src_y + row) * src_stride + src_x;
            let d0 = (dst_y + row) * dst_stride + dst_x;
            if fully_opaque {
                dst[d0..d0 + copy_w].copy_from_slice(&src[s0..s0 + copy_w]);
                continue;
            }
            // premultiplied source-over
            for i in 0..copy_w {
                let s = src[s0 + i];
                let d = dst[d0 + i];
                let inv = 255 - (s >> 24);
                let blend = |shift: u32| {
                    let sc = (s >> shift) & 0xFF;
                    let dc = (d >> shift) & 0xFF;
                    (sc + (dc * inv + 127) / 255).min(255) << shift
                };
                dst[d0 + i] = blend(0) | blend(8) | blend(16) | blend(24);
            }
        }

        if let Some(r) = Rect::from_xywh(dst_x as f32, dst_y as f32, copy_w as f32, copy_h as f32) {
            self.dirty_regions.push(r);
        }
    }

    fn draw_state(&mut self, state: &VisualState) {
        if !state.shows_stimulus() {
            return;
        }
        let square = if state.square_lit() {
            CacheIndex::SquareLit
        } else {
            CacheIndex::SquareDark
        };
        self.blit_cached(square, self.center);
        if self.layout.fixation {
            self.blit_cached(CacheIndex::Fixation, self.center);
        }
        if self.layout.target && state.target_visible {
            let pos = self.layout.target_center(self.width, self.height);
            self.blit_cached(CacheIndex::Target, pos);
        }
    }

    /// Redraws the offscreen canvas for `state`. Nothing reaches the frame
    /// buffer until [`SkiaRenderer::present`].
    pub fn draw(&mut self, state: &VisualState) {
        let old_dirty = std::mem::take(&mut self.dirty_regions);

        let t = self.clock.now();
        self.clear_dirty(&old_dirty);
        let t_clear = self.clock.elapsed(t);

        let t = self.clock.now();
        self.draw_state(state);
        let t_draw = self.clock.elapsed(t);

        self.pending.extend(old_dirty);
        self.pending.extend_from_slice(&self.dirty_regions);
        self.last_draw = (t_clear, t_draw);
        self.record("clear", t_clear);
        self.record("draw", t_draw);
    }

    /// Copies everything changed since the previous present into `frame_buffer`
    /// (RGBA8, `width * height * 4` bytes).
    pub fn present(&mut self, frame_buffer: &mut [u8]) -> Result<FrameStats> {
        if frame_buffer.len() != self.canvas.data().len() {
            bail!(
                "frame buffer holds {} bytes, canvas is {}x{}",
                frame_buffer.len(),
                self.width,
                self.height
            );
        }

        let t = self.clock.now();
        let dirty_count = if self.first_frame {
            self.first_frame = false;
            self.pending.clear();
            frame_buffer.copy_from_slice(self.canvas.data());
            1
        } else {
            let mut rects = std::mem::take(&mut self.pending);
            Self::coalesce_dirty(&mut rects);
            for rect in &rects {
                self.copy_dirty_region(rect, frame_buffer);
            }
            rects.len()
        };
        let t_copy = self.clock.elapsed(t);
        self.record("copy", t_copy);

        let (clear, draw) = self.last_draw;
        Ok(FrameStats {
            clear,
            draw,
            copy: t_copy,
            total: clear + draw + t_copy,
            dirty_count,
        })
    }

    /// `draw` followed by `present`; the total is recorded on `timer`.
    pub fn render_frame(
        &mut self,
        state: &VisualState,
        frame_buffer: &mut [u8],
        timer: &mut HighPrecisionTimer,
    ) -> Result<FrameStats> {
        self.draw(state);
        let stats = self.present(frame_buffer)?;
        timer.record_frame(stats.total);
        Ok(stats)
    }

    fn record(&mut self, component: &'static str, d: Duration) {
        if let Some(timer) = self.component_timers.get_mut(component) {
            timer.record_frame(d);
        }
    }

    /// Timing of one pipeline stage: `"clear"`, `"draw"` or `"copy"`.
    pub fn component_stats(&self, component: &str) -> Option<TickStats> {
        self.component_timers.get(component).map(|t| t.tick_stats())
    }
}

impl Renderer for SkiaRenderer {
    fn render(&mut self, state: &VisualState) -> std::result::Result<(), SinkError> {
        if self.static_cache.len() != CacheIndex::COUNT {
            return Err(SinkError::RenderFailure("shape cache not initialised".into()));
        }
        self.draw(state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssvep_core::{Condition, SessionPhase};

    const W: u32 = 200;
    const H: u32 = 100;

    fn active(condition: Condition, tick: u64, target_visible: bool) -> VisualState {
        VisualState {
            phase: SessionPhase::Active { slot: 0, condition },
            tick,
            flicker_on: tick % 2 == 0,
            gaze_cue: Some(1),
            target_visible,
        }
    }

    fn pixel(fb: &[u8], x: u32, y: u32) -> [u8; 4] {
        let i = ((y * W + x) * 4) as usize;
        [fb[i], fb[i + 1], fb[i + 2], fb[i + 3]]
    }

    fn frame() -> Vec<u8> {
        vec![0u8; (W * H * 4) as usize]
    }

    #[test]
    fn flicker_square_follows_the_half_cycle() {
        let mut r = SkiaRenderer::new(W, H, StimulusLayout::SACCADE).unwrap();
        let mut fb = frame();
        // square spans x 80..120, y 30..70
        r.render(&active(Condition::Experimental, 0, false)).unwrap();
        r.present(&mut fb).unwrap();
        assert_eq!(pixel(&fb, 90, 50), WHITE);
        assert_eq!(pixel(&fb, 10, 10), BLACK);

        r.render(&active(Condition::Experimental, 1, false)).unwrap();
        r.present(&mut fb).unwrap();
        assert_eq!(pixel(&fb, 90, 50), BLACK);
    }

    #[test]
    fn control_square_stays_dark() {
        let mut r = SkiaRenderer::new(W, H, StimulusLayout::SACCADE).unwrap();
        let mut fb = frame();
        r.render(&active(Condition::Control, 0, false)).unwrap();
        r.present(&mut fb).unwrap();
        assert_eq!(pixel(&fb, 90, 50), BLACK);
    }

    #[test]
    fn target_is_drawn_only_while_visible() {
        let mut r = SkiaRenderer::new(W, H, StimulusLayout::SACCADE).unwrap();
        let mut fb = frame();
        r.render(&active(Condition::Experimental, 1, true)).unwrap();
        r.present(&mut fb).unwrap();
        assert_eq!(pixel(&fb, 117, 50), RED);

        r.render(&active(Condition::Experimental, 3, false)).unwrap();
        r.present(&mut fb).unwrap();
        assert_eq!(pixel(&fb, 117, 50), BLACK);
    }

    #[test]
    fn blank_phase_clears_the_previous_stimulus() {
        let mut r = SkiaRenderer::new(W, H, StimulusLayout::GAZE_SHIFT).unwrap();
        let mut fb = frame();
        r.render(&active(Condition::Experimental, 0, false)).unwrap();
        r.present(&mut fb).unwrap();
        assert_eq!(pixel(&fb, 100, 50), WHITE);

        r.render(&VisualState::blank(SessionPhase::PostExperiment)).unwrap();
        let stats = r.present(&mut fb).unwrap();
        assert!(stats.dirty_count > 0);
        assert!(fb.chunks_exact(4).all(|p| p == BLACK));
    }

    #[test]
    fn mismatched_frame_buffer_is_rejected() {
        let mut r = SkiaRenderer::new(W, H, StimulusLayout::SACCADE).unwrap();
        let mut small = vec![0u8; 16];
        assert!(r.present(&mut small).is_err());
    }

    #[test]
    fn resize_rebuilds_canvas_and_shapes() {
        let mut r = SkiaRenderer::new(W, H, StimulusLayout::SACCADE).unwrap();
        r.resize(400, 200).unwrap();
        assert_eq!(r.size(), (400, 200));
        let mut fb = vec![0u8; 400 * 200 * 4];
        r.render(&active(Condition::Experimental, 0, false)).unwrap();
        r.present(&mut fb).unwrap();
        // square side 80, centered at (200, 100)
        let i = ((100 * 400 + 170) * 4) as usize;
        assert_eq!(&fb[i..i + 4], &WHITE);
    }

    #[test]
    fn adjacent_rects_on_a_row_are_merged() {
        let mut rects = vec![
            Rect::from_xywh(10.0, 0.0, 10.0, 5.0).unwrap(),
            Rect::from_xywh(0.0, 0.0, 10.0, 5.0).unwrap(),
            Rect::from_xywh(0.0, 20.0, 10.0, 5.0).unwrap(),
        ];
        SkiaRenderer::coalesce_dirty(&mut rects);
        assert_eq!(rects.len(), 2);
        assert_eq!(rects[0].width(), 20.0);
    }

    #[test]
    fn stage_timings_are_recorded() {
        let mut r = SkiaRenderer::new(W, H, StimulusLayout::SACCADE).unwrap();
        let mut fb = frame();
        let mut timer = HighPrecisionTimer::new();
        for tick in 0..3 {
            r.render_frame(&active(Condition::Experimental, tick, false), &mut fb, &mut timer)
                .unwrap();
        }
        assert_eq!(r.component_stats("draw").unwrap().samples, 3);
        assert_eq!(timer.tick_stats().samples, 3);
        assert!(r.component_stats("bogus").is_none());
    }
}
