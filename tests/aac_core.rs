//! AAC 频域重建核心的端到端测试.
//!
//! 通过根 crate 的公开接口组合反量化、立体声、TNS 与 LTP.

use sheng::codec::aac::band::compute_run_ends;
use sheng::codec::aac::{
    AacDsp, AacDspConfig, BandType, ChannelPair, FixedSf, FloatSf, IcsInfo, LtpInfo,
    MsNormalization, SingleChannelElement, TnsData, TnsMode, WindowSequence,
    apply_mid_side_stereo, dequant_scalefactors, pow2sf,
};

fn long_ics(max_sfb: usize) -> IcsInfo {
    IcsInfo::long(WindowSequence::OnlyLong, max_sfb).unwrap()
}

#[test]
fn test_定点与浮点反量化对应() {
    let ics = long_ics(12);
    let types = [
        BandType::Spectral(1),
        BandType::Spectral(1),
        BandType::Spectral(11),
        BandType::Noise,
        BandType::Noise,
        BandType::Intensity,
        BandType::Intensity,
        BandType::Intensity2,
        BandType::Zero,
        BandType::Zero,
        BandType::Spectral(4),
        BandType::Noise,
    ];
    let mut run_end = [0usize; 12];
    compute_run_ends(&ics, &types, &mut run_end);
    let sfo = [100, 120, 90, -20, 12, 0, 8, -8, 55, 0, 140, 4];

    let mut float_sf = [0.0f64; 12];
    let mut fixed_sf = [0i32; 12];
    dequant_scalefactors(&FloatSf::new(), &ics, &types, &run_end, &sfo, &mut float_sf).unwrap();
    dequant_scalefactors(&FixedSf, &ics, &types, &run_end, &sfo, &mut fixed_sf).unwrap();

    for i in 0..12 {
        let expect = match types[i] {
            BandType::Zero => 0.0,
            BandType::Intensity | BandType::Intensity2 => {
                2f64.powf((fixed_sf[i] - 100) as f64 / 4.0)
            }
            _ => -2f64.powf((-fixed_sf[i] - 100) as f64 / 4.0),
        };
        assert!(
            (float_sf[i] - expect).abs() <= expect.abs() * 1e-12,
            "频带 {i} ({:?}): 浮点 {} 与定点 {} 不对应",
            types[i],
            float_sf[i],
            fixed_sf[i]
        );
    }
    assert_eq!(float_sf[0], -1.0, "sfo=100 的频谱频带增益为 -1");
    assert_eq!(float_sf[5], pow2sf(200));
}

#[test]
fn test_短窗分组强度立体声() {
    let dsp = AacDsp::<f64>::new(AacDspConfig::default());
    let mut states = [dsp.new_ltp_state().unwrap(), dsp.new_ltp_state().unwrap()];
    let mut cpe: ChannelPair<f64> = ChannelPair::new(IcsInfo::eight_short(2, &[3, 5]).unwrap());
    cpe.ms_present = true;
    // 强度频带上 ms_mask 翻转符号
    cpe.ms_mask[0] = true;
    cpe.ch[0].set_band_types(&[BandType::Spectral(1); 4]).unwrap();
    cpe.ch[1]
        .set_band_types(&[
            BandType::Intensity,
            BandType::Spectral(1),
            BandType::Spectral(1),
            BandType::Intensity2,
        ])
        .unwrap();
    cpe.ch[1].sfo[..4].copy_from_slice(&[-4, 0, 0, 8]);
    for (i, v) in cpe.ch[0].coeffs.iter_mut().enumerate() {
        *v = (i % 128) as f64 + 1.0;
    }
    let left = cpe.ch[0].coeffs.clone();

    dsp.decode_channel_pair(&mut cpe, &mut states).unwrap();

    assert_eq!(cpe.ch[0].coeffs, left, "左声道不参与强度重建");
    for w in 0..8 {
        let base = w * 128;
        for k in 0..8 {
            let got = cpe.ch[1].coeffs[base + k];
            let expect = match (w < 3, k < 4) {
                // 第 0 组第 0 带: c = +1, 经 ms_mask 取反, 增益 2
                (true, true) => -2.0 * left[base + k],
                // 第 1 组第 1 带: c = -1, 增益 0.25
                (false, false) => -0.25 * left[base + k],
                _ => 0.0,
            };
            assert_eq!(got, expect, "窗 {w} 系数 {k}");
        }
    }
}

#[test]
fn test_定点_ms_蝶形() {
    let mut cpe: ChannelPair<i32> = ChannelPair::new(long_ics(2));
    cpe.ms_present = true;
    cpe.ms_mask[..2].fill(true);
    for ch in &mut cpe.ch {
        ch.set_band_types(&[BandType::Spectral(3); 2]).unwrap();
        ch.coeffs[..8].fill(1000);
    }
    let mut unity = cpe.clone();
    apply_mid_side_stereo(&mut unity, MsNormalization::Unity.resolve());
    assert!(unity.ch[0].coeffs[..8].iter().all(|&v| v == 2000));
    assert!(unity.ch[1].coeffs[..8].iter().all(|&v| v == 0));

    apply_mid_side_stereo(&mut cpe, MsNormalization::Orthonormal.resolve());
    assert!(
        cpe.ch[0].coeffs[..8].iter().all(|&v| v == 1414),
        "中声道应为 √2 倍: {:?}",
        &cpe.ch[0].coeffs[..8]
    );
    assert!(cpe.ch[1].coeffs[..8].iter().all(|&v| v == 0));
    assert!(cpe.ch[0].coeffs[8..].iter().all(|&v| v == 0), "未传输的频带不变");
}

#[test]
fn test_短窗_tns_分析合成互逆() {
    let dsp = AacDsp::<f32>::new(AacDspConfig::default());
    let ics = IcsInfo::eight_short(14, &[8]).unwrap();
    let mut tns = TnsData::default();
    for w in 0..8 {
        tns.set_filter(w, 0, 8, w % 2 == 1, &[0.5, -0.2]).unwrap();
    }
    let original: Vec<f32> = (0..1024)
        .map(|i| ((i * 53 % 97) as f32 - 48.0) / 48.0)
        .collect();
    let mut coef = original.clone();

    dsp.apply_tns(&mut coef, &tns, &ics, TnsMode::Analysis);
    for w in 0..8 {
        let base = w * 128;
        assert_eq!(
            &coef[base..base + 28],
            &original[base..base + 28],
            "窗 {w} 滤波范围以下的系数不变"
        );
    }
    dsp.apply_tns(&mut coef, &tns, &ics, TnsMode::Synthesis);
    for (i, (a, b)) in coef.iter().zip(&original).enumerate() {
        assert!((a - b).abs() < 1e-4, "系数 {i}: {a} != {b}");
    }
}

#[test]
fn test_ltp_两帧预测() {
    let dsp = AacDsp::<f32>::new(AacDspConfig::default());
    let mut state = dsp.new_ltp_state().unwrap();
    let ics = long_ics(49);

    // 第一帧: 历史为零, 预测不改变频谱
    let mut first = SingleChannelElement::<f32>::new(ics.clone());
    first.ltp = LtpInfo::from_indices(1024, 4, &[true; 40]).unwrap();
    dsp.decode_channel_tail(&mut first, &mut state).unwrap();
    assert!(first.coeffs.iter().all(|&v| v == 0.0));

    let output: Vec<f32> = (0..1024)
        .map(|i| (2.0 * std::f32::consts::PI * i as f32 / 32.0).sin())
        .collect();
    let imdct = vec![0.0f32; 2048];
    let saved = vec![0.0f32; 512];
    dsp.update_ltp(&mut state, &ics, &imdct, &saved, &output).unwrap();
    assert_eq!(&state.history[1024..2048], &output[..]);

    // 第二帧: 带 TNS 时先叠加预测再做合成滤波
    let mut second = SingleChannelElement::<f32>::new(ics.clone());
    second.ltp = LtpInfo::from_indices(1024, 4, &[true; 40]).unwrap();
    second.tns.set_filter(0, 0, 20, false, &[0.3]).unwrap();
    let mut manual = second.clone();
    let mut manual_state = dsp.new_ltp_state().unwrap();
    manual_state.history.copy_from_slice(&state.history);

    dsp.decode_channel_tail(&mut second, &mut state).unwrap();
    let energy: f32 = second.coeffs.iter().map(|v| v * v).sum();
    assert!(energy > 1.0, "有历史时预测应产生频谱, 能量 {energy}");

    dsp.apply_ltp(&mut manual, &mut manual_state).unwrap();
    dsp.apply_tns(&mut manual.coeffs, &manual.tns, &manual.ics, TnsMode::Synthesis);
    assert_eq!(second.coeffs, manual.coeffs);
}

#[test]
fn test_非法边信息报错() {
    assert!(IcsInfo::long(WindowSequence::EightShort, 10).is_err());
    assert!(IcsInfo::long(WindowSequence::OnlyLong, 50).is_err());
    assert!(IcsInfo::eight_short(4, &[3, 3]).is_err(), "分组窗数之和必须为 8");
    assert!(IcsInfo::eight_short(15, &[8]).is_err());
    assert!(BandType::from_codebook(12).is_err());
    assert!(LtpInfo::from_indices(100, 9, &[]).is_err());

    let mut sce = SingleChannelElement::<f64>::new(long_ics(4));
    assert!(sce.set_band_types(&[BandType::Zero; 3]).is_err());
}
