use crate::bus::Bus;
use crate::cpu::M6502;
use crate::video::{PixelSink, Video};
use log::trace;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The machine: a bus with the RAM/VRAM/ROM table, one CPU, one raster
/// scan-out, and the process-wide running flag they both observe.
#[derive(Serialize, Deserialize)]
pub struct Vireo {
    bus: Bus,
    cpu: M6502,
    video: Video,
    #[serde(skip)]
    running: Arc<AtomicBool>,
}

impl Vireo {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bus: Bus::new(),
            cpu: M6502::new(),
            video: Video::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Loads a program image into ROM at offset 0 (absolute 0x8000). The
    /// image is expected to carry the reset vector at its 0x7FFC/0x7FFD
    /// offsets.
    ///
    /// # Errors
    ///
    /// Returns an error if the image does not fit the ROM region.
    pub fn load_program_from_slice(&mut self, data: &[u8]) -> Result<(), &'static str> {
        self.bus.load_rom(data)
    }

    /// Reads a program image to end-of-stream and loads it into ROM.
    ///
    /// # Errors
    ///
    /// I/O errors abort the load.
    pub fn load_program<R: Read>(&mut self, reader: R) -> std::io::Result<usize> {
        self.bus.load_rom_from_reader(reader)
    }

    /// Resets the CPU through the reset vector and rewinds the scan-out
    /// cursor.
    pub fn reset(&mut self) {
        self.cpu.reset(&self.bus);
        self.video.reset();
    }

    /// Runs the CPU loop on a scoped thread and the scan-out on the
    /// calling thread (rendering backends tend to be main-thread-bound).
    /// Returns once `running` has been cleared: by a sink Quit event, a
    /// sink failure, or `stop()`. The CPU loop ends early when its cycle
    /// budget is exhausted; the scan-out keeps presenting until stopped.
    pub fn run<S: PixelSink>(&mut self, sink: &mut S, budget_cycles: u64) {
        self.running.store(true, Ordering::Release);
        let bus = &self.bus;
        let cpu = &mut self.cpu;
        let video = &mut self.video;
        let running: &AtomicBool = self.running.as_ref();

        std::thread::scope(|s| {
            s.spawn(move || {
                let consumed = cpu.execute(bus, budget_cycles, running);
                trace!("cpu loop done, {consumed} cycles");
            });
            video.run(bus, sink, running);
        });
    }

    /// Executes a single CPU instruction; the scan-out does not advance.
    pub fn step_cpu(&mut self) -> u64 {
        self.cpu.step(&self.bus)
    }

    /// Raises a maskable interrupt.
    pub fn irq(&mut self) {
        self.cpu.irq(&self.bus);
    }

    /// Raises a non-maskable interrupt.
    pub fn nmi(&mut self) {
        self.cpu.nmi(&self.bus);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// A handle the host event loop can clear from another thread.
    #[must_use]
    pub fn running_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    #[must_use]
    pub fn cpu(&self) -> &M6502 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut M6502 {
        &mut self.cpu
    }

    #[must_use]
    pub fn video(&self) -> &Video {
        &self.video
    }

    pub fn video_mut(&mut self) -> &mut Video {
        &mut self.video
    }
}

impl Default for Vireo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{ROM_SIZE, VRAM_ADDR};
    use crate::video::SinkEvent;
    use std::time::Duration;

    struct CountingSink {
        first_pixel: Option<(u32, u32, (u8, u8, u8))>,
        color: (u8, u8, u8),
        presented: usize,
        quit_after_frames: usize,
    }

    impl CountingSink {
        fn new(quit_after_frames: usize) -> Self {
            Self {
                first_pixel: None,
                color: (0, 0, 0),
                presented: 0,
                quit_after_frames,
            }
        }
    }

    impl PixelSink for CountingSink {
        fn set_color(&mut self, r: u8, g: u8, b: u8) {
            self.color = (r, g, b);
        }

        fn draw_point(&mut self, x: u32, y: u32) -> Result<(), &'static str> {
            if self.first_pixel.is_none() {
                self.first_pixel = Some((x, y, self.color));
            }
            Ok(())
        }

        fn present(&mut self) -> Result<(), &'static str> {
            self.presented += 1;
            Ok(())
        }

        fn poll_events(&mut self) -> SinkEvent {
            if self.presented >= self.quit_after_frames {
                SinkEvent::Quit
            } else {
                SinkEvent::None
            }
        }
    }

    fn image_with(prog: &[u8]) -> Vec<u8> {
        let mut image = vec![0u8; ROM_SIZE];
        image[..prog.len()].copy_from_slice(prog);
        image[0x7FFC] = 0x00; // RESET -> $8000
        image[0x7FFD] = 0x80;
        image
    }

    #[test]
    fn scanout_handshake() {
        // The program paints (0, 0) full white, then spins.
        let mut machine = Vireo::new();
        machine
            .load_program_from_slice(&image_with(&[
                0xA9, 0xFC,         // LDA #$FC
                0x8D, 0x00, 0x60,   // STA $6000
                0x4C, 0x05, 0x80,   // JMP $8005
            ]))
            .unwrap();
        machine.reset();
        // settle the program before scanning so the first frame is fixed
        while machine.cpu().pc() != 0x8005 {
            machine.step_cpu();
        }
        machine.video_mut().set_frame_delay(Duration::from_millis(0));

        let mut sink = CountingSink::new(1);
        machine.run(&mut sink, 0);

        assert_eq!(sink.first_pixel, Some((0, 0, (255, 255, 255))));
        assert_eq!(sink.presented, 1);
        assert!(!machine.running());
    }

    #[test]
    fn concurrent_run_stops_both_loops() {
        let mut machine = Vireo::new();
        machine
            .load_program_from_slice(&image_with(&[
                0xEE, 0x00, 0x60,   // INC $6000
                0x4C, 0x00, 0x80,   // JMP $8000
            ]))
            .unwrap();
        machine.reset();
        machine.video_mut().set_frame_delay(Duration::from_millis(0));

        let mut sink = CountingSink::new(2);
        machine.run(&mut sink, u64::MAX);

        assert!(!machine.running());
        assert_eq!(sink.presented, 2);
        assert!(machine.cpu().cycles() > 0);
    }

    #[test]
    fn stop_handle_cancels_run() {
        let mut machine = Vireo::new();
        machine
            .load_program_from_slice(&image_with(&[0x4C, 0x00, 0x80]))
            .unwrap();
        machine.reset();
        machine.video_mut().set_frame_delay(Duration::from_millis(0));
        let handle = machine.running_handle();

        // a stand-in for the host event loop
        let quitter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            handle.store(false, Ordering::Release);
        });

        let mut sink = CountingSink::new(usize::MAX);
        machine.run(&mut sink, u64::MAX);
        quitter.join().unwrap();
        assert!(!machine.running());
    }

    #[test]
    fn savestate_roundtrip() {
        let mut machine = Vireo::new();
        machine
            .load_program_from_slice(&image_with(&[
                0xA9, 0x42,         // LDA #$42
                0x8D, 0x10, 0x00,   // STA $0010
                0x8D, 0x00, 0x60,   // STA $6000
            ]))
            .unwrap();
        machine.reset();
        for _ in 0..3 {
            machine.step_cpu();
        }

        let mut buf = vec![0u8; 0x40000];
        crate::serialize(&machine, &mut buf).unwrap();
        let restored = crate::deserialize(&buf).unwrap();

        assert_eq!(restored.cpu().a(), 0x42);
        assert_eq!(restored.cpu().pc(), machine.cpu().pc());
        assert_eq!(restored.cpu().cycles(), machine.cpu().cycles());
        assert_eq!(restored.bus().read(0x0010), 0x42);
        assert_eq!(restored.bus().read(VRAM_ADDR), 0x42);
        assert_eq!(restored.bus().read(0x8000), 0xA9);
        assert!(!restored.running());
    }

    #[test]
    fn load_from_reader() {
        let mut machine = Vireo::new();
        let image = image_with(&[0xEA]);
        let n = machine.load_program(&image[..]).unwrap();
        assert_eq!(n, ROM_SIZE);
        machine.reset();
        assert_eq!(machine.cpu().pc(), 0x8000);
    }
}
