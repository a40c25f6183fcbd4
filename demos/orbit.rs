//! Plays a tone circling the listener on the default output device.

use anyhow::Result;
use sonance::{ContextDesc, Engine, Source, Vec3};
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    env_logger::init();

    let mut engine = Engine::new(ContextDesc::new().sample_rate(48000).block_size(512))?;
    let context = engine.context().clone();

    let tone = context.create_sample();
    tone.set_name("tone");
    tone.generate_sine(440.0, 1.0)?;

    let emitter = context.create_object();
    emitter.play("tone", Source::new(&tone)?.with_loop(true))?;
    engine.start()?;

    let radius = 2.0;
    let period = Duration::from_secs(4);
    let start = Instant::now();
    while start.elapsed() < period * 3 {
        let t = start.elapsed().as_secs_f32() / period.as_secs_f32();
        let angle = t * std::f32::consts::TAU;
        emitter.set_position(Vec3::new(angle.sin() * radius, angle.cos() * radius, 0.0))?;
        std::thread::sleep(Duration::from_millis(10));
    }

    emitter.autodelete()?;
    std::thread::sleep(Duration::from_millis(200));
    println!("Rendered {} frames", engine.frames_processed());
    engine.stop()?;
    Ok(())
}
