#![no_main]
use libfuzzer_sys::fuzz_target;
use windelta::stream::{Collector, CutStrategy, DecoderOptions, make_decoder};
use windelta::window::BuilderKind;

fuzz_target!(|data: &[u8]| {
    // Header bytes pick the configuration; the rest is the stream.
    let Some((&[cap, policy, arg, step], stream)) = data.split_first_chunk::<4>() else {
        return;
    };
    let capacity = usize::from(cap).max(1);
    let strategy = match policy % 3 {
        0 => CutStrategy::Fixed,
        1 => CutStrategy::Delimited(arg),
        _ => CutStrategy::ContentDefined {
            min_len: usize::from(arg),
            mask_bits: u32::from(arg % 8),
        },
    };
    let builder = if policy & 0x80 != 0 {
        BuilderKind::RunLength {
            min_run: usize::from(arg % 16),
        }
    } else {
        BuilderKind::Literal
    };
    let options = DecoderOptions::default()
        .with_capacity(capacity)
        .with_strategy(strategy)
        .with_builder(builder);

    let mut dec = make_decoder(Collector::new(), options).unwrap();
    for chunk in stream.chunks(usize::from(step).max(1)) {
        dec.ingest(chunk).unwrap();
    }
    let (collector, stats) = dec.finish().unwrap();

    // Windows tile the stream, in order, each within capacity.
    assert_eq!(collector.concat_payloads(), stream);
    assert_eq!(stats.bytes_delivered, stream.len() as u64);
    let mut offset = 0u64;
    for (i, w) in collector.windows().iter().enumerate() {
        assert_eq!(w.index(), i as u64);
        assert_eq!(w.stream_offset(), offset);
        assert!(!w.is_empty() && w.len() <= capacity);
        assert_eq!(w.target_len(), w.len() as u64);
        offset += w.len() as u64;
    }
});
