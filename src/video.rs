use crate::bus::Bus;
use crate::consts::{DEFAULT_FRAME_DELAY_MS, SCREEN_HEIGHT, SCREEN_WIDTH, VRAM_ADDR, VRAM_ROW_SHIFT};
use log::{error, trace};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkEvent {
    None,
    Quit,
}

/// The rendering collaborator. Draw failures are treated as a request to
/// stop.
pub trait PixelSink {
    fn set_color(&mut self, r: u8, g: u8, b: u8);
    fn draw_point(&mut self, x: u32, y: u32) -> Result<(), &'static str>;
    fn present(&mut self) -> Result<(), &'static str>;
    fn poll_events(&mut self) -> SinkEvent;
}

/// Expands a `RR GG BB xx` byte to 8-bit channels.
#[inline]
#[must_use]
pub fn expand_color(pixel: u8) -> (u8, u8, u8) {
    let channel = |c: u8| (u16::from(c) * 255 / 3) as u8;
    (
        channel(pixel >> 6 & 0b11),
        channel(pixel >> 4 & 0b11),
        channel(pixel >> 2 & 0b11),
    )
}

/// Walks VRAM in raster order and feeds pixels to the sink, one frame
/// after another, until stopped.
#[derive(Serialize, Deserialize)]
pub struct Video {
    x: u32,
    y: u32,
    frame_delay: Duration,
}

impl Video {
    #[must_use]
    pub fn new() -> Self {
        Self {
            x: 0,
            y: 0,
            frame_delay: Duration::from_millis(DEFAULT_FRAME_DELAY_MS),
        }
    }

    #[inline]
    #[must_use]
    pub fn cursor(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    #[inline]
    #[must_use]
    pub fn frame_delay(&self) -> Duration {
        self.frame_delay
    }

    #[inline]
    pub fn set_frame_delay(&mut self, delay: Duration) {
        self.frame_delay = delay;
    }

    pub fn reset(&mut self) {
        self.x = 0;
        self.y = 0;
    }

    /// Emits the pixel under the cursor and advances it. Returns `true`
    /// when the pixel completed a frame (the frame was presented).
    ///
    /// # Errors
    ///
    /// Propagates sink failures.
    pub fn step_pixel(
        &mut self,
        bus: &Bus,
        sink: &mut dyn PixelSink,
    ) -> Result<bool, &'static str> {
        let pixel = bus.read(VRAM_ADDR + (self.y << VRAM_ROW_SHIFT | self.x) as u16);
        let (r, g, b) = expand_color(pixel);
        sink.set_color(r, g, b);
        sink.draw_point(self.x, self.y)?;

        self.x += 1;
        if self.x >= SCREEN_WIDTH {
            self.x = 0;
            self.y += 1;
            if self.y >= SCREEN_HEIGHT {
                self.y = 0;
                sink.present()?;
                trace!("frame presented");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The scan-out loop: runs until `running` clears, yielding
    /// `frame_delay` after each presented frame. A Quit event or a sink
    /// failure clears `running` for every other worker too.
    pub fn run(&mut self, bus: &Bus, sink: &mut dyn PixelSink, running: &AtomicBool) {
        while running.load(Ordering::Acquire) {
            if sink.poll_events() == SinkEvent::Quit {
                running.store(false, Ordering::Release);
                break;
            }
            match self.step_pixel(bus, sink) {
                Err(e) => {
                    error!("pixel sink failed: {e}");
                    running.store(false, Ordering::Release);
                }
                Ok(true) => std::thread::sleep(self.frame_delay),
                Ok(false) => (),
            }
        }
    }
}

impl Default for Video {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        color: (u8, u8, u8),
        points: Vec<(u32, u32, (u8, u8, u8))>,
        presented: usize,
        quit_after_frames: Option<usize>,
        fail_draws: bool,
    }

    impl PixelSink for RecordingSink {
        fn set_color(&mut self, r: u8, g: u8, b: u8) {
            self.color = (r, g, b);
        }

        fn draw_point(&mut self, x: u32, y: u32) -> Result<(), &'static str> {
            if self.fail_draws {
                return Err("draw failed");
            }
            self.points.push((x, y, self.color));
            Ok(())
        }

        fn present(&mut self) -> Result<(), &'static str> {
            self.presented += 1;
            Ok(())
        }

        fn poll_events(&mut self) -> SinkEvent {
            match self.quit_after_frames {
                Some(n) if self.presented >= n => SinkEvent::Quit,
                _ => SinkEvent::None,
            }
        }
    }

    #[test]
    fn color_expansion() {
        assert_eq!(expand_color(0x00), (0, 0, 0));
        assert_eq!(expand_color(0xFC), (255, 255, 255));
        assert_eq!(expand_color(0xF0), (255, 255, 0));
        assert_eq!(expand_color(0b0101_0100), (85, 85, 85));
        assert_eq!(expand_color(0b1000_0000), (170, 0, 0));
    }

    #[test]
    fn first_pixel_handshake() {
        // VRAM (0, 0) = $FC: red 3, green 3, blue 3
        let bus = Bus::new();
        bus.write(VRAM_ADDR, 0xFC);
        let mut video = Video::new();
        let mut sink = RecordingSink::default();

        assert!(!video.step_pixel(&bus, &mut sink).unwrap());
        assert_eq!(sink.points[0], (0, 0, (255, 255, 255)));
        assert_eq!(video.cursor(), (1, 0));
    }

    #[test]
    fn raster_order_and_row_pitch() {
        let bus = Bus::new();
        // rows are 128 bytes apart; x stops at 99
        bus.write(VRAM_ADDR + 99, 0x04); // (99, 0) blue 1
        bus.write(VRAM_ADDR + 128, 0x10); // (0, 1) green 1
        let mut video = Video::new();
        let mut sink = RecordingSink::default();

        for _ in 0..(SCREEN_WIDTH + 1) {
            video.step_pixel(&bus, &mut sink).unwrap();
        }
        assert_eq!(sink.points[99], (99, 0, (0, 0, 85)));
        assert_eq!(sink.points[100], (0, 1, (0, 85, 0)));
    }

    #[test]
    fn frame_wraps_and_presents() {
        let bus = Bus::new();
        let mut video = Video::new();
        let mut sink = RecordingSink::default();

        let pixels = SCREEN_WIDTH as usize * SCREEN_HEIGHT as usize;
        for i in 0..pixels {
            let done = video.step_pixel(&bus, &mut sink).unwrap();
            assert_eq!(done, i == pixels - 1);
        }
        assert_eq!(sink.presented, 1);
        assert_eq!(video.cursor(), (0, 0));
    }

    #[test]
    fn run_stops_on_quit() {
        let bus = Bus::new();
        let mut video = Video::new();
        video.set_frame_delay(Duration::from_millis(0));
        let mut sink = RecordingSink {
            quit_after_frames: Some(2),
            ..Default::default()
        };
        let running = AtomicBool::new(true);

        video.run(&bus, &mut sink, &running);
        assert_eq!(sink.presented, 2);
        assert!(!running.load(Ordering::Acquire));
    }

    #[test]
    fn run_stops_on_sink_failure() {
        let bus = Bus::new();
        let mut video = Video::new();
        let mut sink = RecordingSink {
            fail_draws: true,
            ..Default::default()
        };
        let running = AtomicBool::new(true);

        video.run(&bus, &mut sink, &running);
        assert!(!running.load(Ordering::Acquire));
        assert_eq!(sink.presented, 0);
    }
}
