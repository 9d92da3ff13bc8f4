//! Sheng 性能基准测试.
//!
//! 覆盖 AAC 频域重建、分段卷积、IIR 各实现形式与环绕声上混.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use sheng::codec::AudioFrame;
use sheng::codec::aac::{
    AacDsp, AacDspConfig, BandType, ChannelPair, IcsInfo, TnsData, TnsMode, WindowSequence,
};
use sheng::core::ChannelLayout;
use sheng::filter::{Filter, create_filter};

/// 伪随机立体声帧
fn make_stereo_frame(nb_samples: usize) -> AudioFrame {
    let mut state = 1u32;
    let mut next = || {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 8) as f64 / (1u32 << 24) as f64 - 0.5
    };
    let left: Vec<f64> = (0..nb_samples).map(|_| next()).collect();
    let right: Vec<f64> = (0..nb_samples).map(|_| next()).collect();
    AudioFrame::from_planes(&[left, right], 48000, ChannelLayout::STEREO).unwrap()
}

/// 送入一帧并取空输出
fn run_filter(filter: &mut dyn Filter, frame: &AudioFrame) {
    filter.send_frame(frame).unwrap();
    while let Ok(out) = filter.receive_frame() {
        black_box(out);
    }
}

fn bench_aac_channel_pair(c: &mut Criterion) {
    c.bench_function("aac_cpe_ms_tns_1024_f32", |b| {
        let dsp = AacDsp::<f32>::new(AacDspConfig::default());
        let mut states = [dsp.new_ltp_state().unwrap(), dsp.new_ltp_state().unwrap()];
        let ics = IcsInfo::long(WindowSequence::OnlyLong, 49).unwrap();
        let mut template: ChannelPair<f32> = ChannelPair::new(ics);
        template.ms_present = true;
        template.ms_mask[..49].fill(true);
        for (ch, sce) in template.ch.iter_mut().enumerate() {
            sce.set_band_types(&[BandType::Spectral(5); 49]).unwrap();
            sce.sfo[..49].fill(100);
            for (i, v) in sce.coeffs.iter_mut().enumerate() {
                *v = ((i * 37 + ch * 11) % 64) as f32 - 32.0;
            }
            sce.tns.set_filter(0, 0, 49, false, &[0.6, -0.3, 0.1]).unwrap();
        }

        b.iter(|| {
            let mut cpe = template.clone();
            dsp.decode_channel_pair(&mut cpe, &mut states).unwrap();
            black_box(&cpe);
        });
    });
}

fn bench_tns_analysis(c: &mut Criterion) {
    c.bench_function("aac_tns_analysis_order8", |b| {
        let dsp = AacDsp::<f64>::new(AacDspConfig::default());
        let ics = IcsInfo::long(WindowSequence::OnlyLong, 49).unwrap();
        let mut tns = TnsData::default();
        tns.set_filter(0, 0, 49, true, &[0.5, -0.4, 0.3, -0.2, 0.1, 0.05, -0.05, 0.02])
            .unwrap();
        let mut coef: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.1).sin()).collect();

        b.iter(|| {
            dsp.apply_tns(&mut coef, &tns, &ics, TnsMode::Analysis);
            dsp.apply_tns(&mut coef, &tns, &ics, TnsMode::Synthesis);
            black_box(&coef);
        });
    });
}

fn bench_afir(c: &mut Criterion) {
    c.bench_function("afir_stereo_ir8192_block1024", |b| {
        let ir: Vec<f64> = (0..8192)
            .map(|i| (i as f64 * 0.07).cos() * (-(i as f64) / 2000.0).exp())
            .collect();
        let config = serde_json::json!({ "irs": [[ir]], "minp": 64, "maxp": 2048 });
        let mut filter = create_filter("afir", &config.to_string()).unwrap();
        let frame = make_stereo_frame(1024);
        b.iter(|| run_filter(filter.as_mut(), black_box(&frame)));
    });
}

fn bench_aiir(c: &mut Criterion) {
    let zeros = "-1+0i -1-0i 0.8+0.5i 0.8-0.5i 0.2+0.9i 0.2-0.9i";
    let poles = "0.9+0.1i 0.9-0.1i 0.7+0.5i 0.7-0.5i 0.5+0.3i 0.5-0.3i";
    for (name, process) in [
        ("aiir_serial_order6", "s"),
        ("aiir_parallel_order6", "p"),
        ("aiir_direct_order6", "d"),
    ] {
        c.bench_function(name, |b| {
            let config = format!(
                r#"{{"format": "zp", "process": "{process}", "zeros": "{zeros}", "poles": "{poles}"}}"#
            );
            let mut filter = create_filter("aiir", &config).unwrap();
            let frame = make_stereo_frame(4096);
            b.iter(|| run_filter(filter.as_mut(), black_box(&frame)));
        });
    }
}

fn bench_surround(c: &mut Criterion) {
    c.bench_function("surround_stereo_to_5_1_win4096", |b| {
        let mut filter = create_filter("surround", r#"{"win_size": 4096}"#).unwrap();
        let frame = make_stereo_frame(2048);
        b.iter(|| run_filter(filter.as_mut(), black_box(&frame)));
    });
}

criterion_group!(
    benches,
    bench_aac_channel_pair,
    bench_tns_analysis,
    bench_afir,
    bench_aiir,
    bench_surround,
);
criterion_main!(benches);
