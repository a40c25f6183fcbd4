//! Renders a short scene offline and dumps the mix as raw PCM.
//!
//! Usage: render_to_file [output.raw] [clip-to-stream]

use anyhow::{Context as _, Result};
use sonance::{
    AttenuationModel, Context, ContextDesc, DistanceModel, LoadOptions, MemoryStream, Source,
    Vec3, load_audio_file,
};

fn main() -> Result<()> {
    env_logger::init();
    let mut args = std::env::args().skip(1);
    let output = args.next().unwrap_or_else(|| "mix.raw".into());

    let mut model = DistanceModel::new(AttenuationModel::Inverse, true, 64.0);
    model.doppler_factor = 1.0;
    let desc = ContextDesc::new().distance_model(model);
    let block = desc.block_size * desc.channels as usize;
    let context = Context::new(desc)?;

    if let Some(clip) = args.next() {
        let audio = load_audio_file(&clip, &LoadOptions::default())
            .with_context(|| format!("loading {clip}"))?;
        context.play(0, Box::new(audio.to_stream()?), true)?;
        context.set_volume(0, 0.3);
    } else {
        let hum: Vec<i16> = (0..4410)
            .map(|n| ((n as f32 * 0.0142).sin() * 4000.0) as i16)
            .collect();
        context.play(0, Box::new(MemoryStream::from_pcm(44100, 1, &hum)?), true)?;
    }

    let siren = context.create_sample();
    siren.generate_sine(880.0, 0.5)?;
    let car = context.create_object();
    car.play("siren", Source::new(&siren)?.with_loop(true))?;

    context.save(&output)?;
    let spec = context.spec();
    let blocks = 5 * spec.sample_rate as usize * spec.channels as usize / block;
    let mut out = vec![0i16; block];
    for i in 0..blocks {
        // drive past the listener at 20 m/s
        let x = -50.0 + 100.0 * i as f32 / blocks as f32;
        car.update(Vec3::new(x, 3.0, 0.0), Vec3::new(20.0, 0.0, 0.0), Vec3::ZERO)?;
        context.process(&mut out);
    }
    context.save("")?;

    println!(
        "Wrote {blocks} blocks of {} Hz {}-channel S16 to {output}",
        spec.sample_rate, spec.channels
    );
    Ok(())
}
