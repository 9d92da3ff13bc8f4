use super::position::{
    AxisMap, ChannelPan, angle_transform, calculate_factors, depth_transform, focus_transform,
    lfe_weight, shift_transform, stereo_position,
};
use super::*;

/// 按给定帧长送入, 刷新后返回各输出声道全部采样
fn run<S: Sample>(
    filter: &mut SurroundFilter,
    planes: &[Vec<S>],
    layout: ChannelLayout,
    chunk: usize,
) -> Vec<Vec<S>> {
    let mut out: Vec<Vec<S>> = Vec::new();
    let collect = |f: &mut SurroundFilter, out: &mut Vec<Vec<S>>| {
        while let Ok(frame) = f.receive_frame() {
            assert_eq!(frame.channel_layout, f.output_layout());
            let p = frame.planes::<S>().unwrap();
            out.resize(p.len(), Vec::new());
            for (d, s) in out.iter_mut().zip(p) {
                d.extend(s);
            }
        }
    };
    let len = planes[0].len();
    let mut pos = 0;
    while pos < len {
        let end = (pos + chunk).min(len);
        let part: Vec<Vec<S>> = planes.iter().map(|p| p[pos..end].to_vec()).collect();
        let frame = AudioFrame::from_planes(&part, 48000, layout).unwrap();
        filter.send_frame(&frame).unwrap();
        collect(filter, &mut out);
        pos = end;
    }
    filter.flush().unwrap();
    collect(filter, &mut out);
    out
}

fn energy(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

fn noise(len: usize, seed: u32) -> Vec<f64> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            ((state >> 16) & 0x7fff) as f64 / 16384.0 - 1.0
        })
        .collect()
}

fn small_config(chl_in: &str) -> SurroundConfig {
    SurroundConfig {
        chl_in: chl_in.into(),
        win_size: 256,
        ..Default::default()
    }
}

#[test]
fn test_位置始终在单位范围内() {
    let values = noise(4000, 7);
    for chunk in values.chunks(4) {
        let scale = [1e-6, 1.0, 1e3, 1e9];
        for s in scale {
            let (l, r) = (chunk[0].abs() * s, chunk[1].abs() * s);
            let (im, re) = (chunk[2] * s * s, chunk[3] * s * s);
            let (x, y, z) = stereo_position(l, r, im, re);
            for v in [x, y, z] {
                assert!((-1.0..=1.0).contains(&v), "位置越界: {v}");
            }
        }
    }
    let (x, y, z) = stereo_position(0.0f32, 0.0, 0.0, 0.0);
    assert_eq!((x, y, z), (0.0, 0.0, 0.0));
}

#[test]
fn test_非有限输入位置为零() {
    assert_eq!(
        stereo_position(f64::NAN, f64::NAN, f64::NAN, f64::NAN),
        (0.0, 0.0, 0.0)
    );
    let inf = f64::INFINITY;
    assert_eq!(stereo_position(inf, inf, inf, inf), (0.0, 0.0, 0.0));
    let (x, y, _) = stereo_position(1.0, f64::NAN, 0.0, 1.0);
    assert_eq!((x, y), (0.0, 0.0));
}

#[test]
fn test_同相与反相位置() {
    let (x, y, z) = stereo_position(1.0f64, 1.0, 0.0, 1.0);
    assert_eq!(x, 0.0);
    assert!((y - 1.0).abs() < 1e-6, "同相内容应在正前方: {y}");
    assert_eq!(z, 0.0);

    let (_, y, _) = stereo_position(1.0f64, 1.0, 0.0, -1.0);
    assert!((y + 1.0).abs() < 1e-6, "反相内容应在正后方: {y}");

    // 左声道更响时 x 为负
    let (x, _, _) = stereo_position(2.0, 1.0, 0.0, 2.0);
    assert!(x < 0.0);
}

#[test]
fn test_低频权重() {
    assert_eq!(lfe_weight(5, 10.0, 20.0), 1.0);
    assert_eq!(lfe_weight(20, 10.0, 20.0), 0.0);
    assert_eq!(lfe_weight(30, 10.0, 20.0), 0.0);
    assert!((lfe_weight(15, 10.0f64, 20.0) - 0.5).abs() < 1e-12);
    assert!((lfe_weight(10, 10.0f64, 20.0) - 1.0).abs() < 1e-12);
}

#[test]
fn test_坐标变换() {
    let mut v = 0.8;
    shift_transform(&mut v, 0.5);
    assert_eq!(v, 1.0, "平移后截断");

    let mut v = -0.4f64;
    depth_transform(&mut v, 0.5);
    assert_eq!(v, -0.4, "正深度不作用于负半轴");
    depth_transform(&mut v, -0.5);
    assert!((v + 0.2).abs() < 1e-12);

    // 正前方不受张角影响
    let (mut x, mut y) = (0.0f64, 1.0f64);
    angle_transform(&mut x, &mut y, 60.0);
    assert!(x.abs() < 1e-12 && (y - 1.0).abs() < 1e-9);

    let (mut x, mut y) = (0.3, 0.2);
    angle_transform(&mut x, &mut y, 90.0);
    focus_transform(&mut x, &mut y, 0.0);
    assert_eq!((x, y), (0.3, 0.2), "默认参数不改变位置");

    let (mut x, mut y) = (0.3f64, 0.3);
    focus_transform(&mut x, &mut y, 0.5);
    assert!(x.hypot(y) > 0.3f64.hypot(0.3), "聚焦把声像推向外侧");
}

#[test]
fn test_声道权重() {
    let pos = (&[-1.0, 0.0][..], &[1.0, 1.0][..], &[0.0, 0.0][..]);
    let mut factors = [0.0; 2];

    calculate_factors(
        &ChannelPan::of(Channel::FrontLeft),
        [2.0; 3],
        pos,
        &mut factors,
    );
    assert_eq!(factors, [1.0, 0.25]);

    calculate_factors(
        &ChannelPan::of(Channel::FrontRight),
        [2.0; 3],
        pos,
        &mut factors,
    );
    assert_eq!(factors[0], 0.0, "右声道不含左侧内容");

    calculate_factors(
        &ChannelPan::of(Channel::FrontCenter),
        [2.0; 3],
        pos,
        &mut factors,
    );
    assert_eq!(factors, [0.0, 1.0]);

    calculate_factors(
        &ChannelPan::of(Channel::BackLeft),
        [2.0; 3],
        pos,
        &mut factors,
    );
    assert_eq!(factors, [0.0, 0.0], "前方内容不进入后方声道");

    // 一般指数路径与平方快速路径一致
    let mut general = [0.0f64; 2];
    let left = ChannelPan::of(Channel::FrontLeft);
    calculate_factors(&left, [2.0, 2.0, 2.000001], pos, &mut general);
    assert!((general[1] - 0.25).abs() < 1e-6);

    let pan = ChannelPan::of(Channel::TopFrontRight);
    assert_eq!(
        (pan.x, pan.y, pan.z),
        (AxisMap::Rising, AxisMap::Rising, AxisMap::Rising)
    );
    assert_eq!(pan.dif_sign, -1.0);
    assert_eq!(ChannelPan::of(Channel::LowFrequency).dif_sign, 0.0);
}

#[test]
fn test_立体声上混到5_1() {
    let len = 4000;
    let sine: Vec<f64> = (0..len)
        .map(|i| 0.5 * (2.0 * std::f64::consts::PI * 1000.0 * i as f64 / 48000.0).sin())
        .collect();
    let mut filter = SurroundFilter::new(small_config("stereo")).unwrap();
    let out = run(&mut filter, &[sine.clone(), sine.clone()], ChannelLayout::STEREO, 500);
    assert_eq!(out.len(), 6);
    assert!(out.iter().all(|p| p.len() == len), "输出长度应等于输入长度");

    let layout = ChannelLayout::SURROUND_5_1;
    let fc = energy(&out[layout.index_of(Channel::FrontCenter).unwrap()]);
    let fl = energy(&out[layout.index_of(Channel::FrontLeft).unwrap()]);
    let bl = energy(&out[layout.index_of(Channel::BackLeft).unwrap()]);
    let lfe = energy(&out[layout.index_of(Channel::LowFrequency).unwrap()]);
    assert!(fc > fl, "居中内容主要进入中置");
    assert!(bl < fc * 0.01, "同相内容不应进入后方: {bl} / {fc}");
    assert!(lfe < fc * 0.01, "1 kHz 不应进入 LFE: {lfe} / {fc}");
}

#[test]
fn test_低频生成() {
    let len = 4000;
    let low: Vec<f64> = (0..len)
        .map(|i| 0.5 * (2.0 * std::f64::consts::PI * 50.0 * i as f64 / 48000.0).sin())
        .collect();
    let mut filter = SurroundFilter::new(SurroundConfig {
        win_size: 2048,
        ..Default::default()
    })
    .unwrap();
    let out = run(&mut filter, &[low.clone(), low.clone()], ChannelLayout::STEREO, 1000);
    let lfe = &out[ChannelLayout::SURROUND_5_1.index_of(Channel::LowFrequency).unwrap()];
    assert!(energy(&lfe[2048..]) > 0.1 * energy(&low[2048..]), "50 Hz 应进入 LFE");

    let mut filter = SurroundFilter::new(SurroundConfig {
        win_size: 2048,
        lfe: false,
        ..Default::default()
    })
    .unwrap();
    let out = run(&mut filter, &[low.clone(), low], ChannelLayout::STEREO, 1000);
    assert_eq!(out.len(), 6);
}

#[test]
fn test_输入lfe与中置透传() {
    let len = 1500;
    let (l, r, c, lfe) = (noise(len, 1), noise(len, 2), noise(len, 3), noise(len, 4));

    let mut filter = SurroundFilter::new(small_config("2.1")).unwrap();
    let out = run(
        &mut filter,
        &[l.clone(), r.clone(), lfe.clone()],
        ChannelLayout::LAYOUT_2_1,
        300,
    );
    let idx = ChannelLayout::SURROUND_5_1.index_of(Channel::LowFrequency).unwrap();
    for (i, (a, b)) in out[idx].iter().zip(&lfe).enumerate() {
        assert!((a - b).abs() < 1e-9, "LFE 第 {i} 点: {a} != {b}");
    }

    let mut filter = SurroundFilter::new(small_config("3.0")).unwrap();
    let out = run(&mut filter, &[l, r, c.clone()], ChannelLayout::SURROUND, 300);
    let idx = ChannelLayout::SURROUND_5_1.index_of(Channel::FrontCenter).unwrap();
    for (a, b) in out[idx].iter().zip(&c) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn test_单精度与平滑() {
    let len = 2000;
    let l: Vec<f32> = noise(len, 11).iter().map(|&v| v as f32).collect();
    let r: Vec<f32> = noise(len, 12).iter().map(|&v| v as f32).collect();
    let mut filter = SurroundFilter::new(SurroundConfig {
        chl_out: "7.1".into(),
        smooth: 0.3,
        focus: -0.2,
        angle: 60.0,
        ..small_config("stereo")
    })
    .unwrap();
    let out = run(&mut filter, &[l, r], ChannelLayout::STEREO, 333);
    assert_eq!(out.len(), 8);
    for plane in &out {
        assert_eq!(plane.len(), len);
        assert!(plane.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn test_参数与格式校验() {
    assert!(matches!(
        SurroundFilter::new(SurroundConfig {
            chl_in: "mono".into(),
            ..Default::default()
        }),
        Err(ShengError::Unsupported(_))
    ));
    assert!(
        SurroundFilter::new(SurroundConfig {
            chl_out: "9.2".into(),
            ..Default::default()
        })
        .is_err()
    );
    assert!(
        SurroundFilter::new(SurroundConfig {
            lfe_low: 300,
            ..Default::default()
        })
        .is_err()
    );

    let mut filter = SurroundFilter::new(small_config("stereo")).unwrap();
    let mono = AudioFrame::from_planes(&[vec![0.0f64; 16]], 48000, ChannelLayout::MONO).unwrap();
    assert!(matches!(
        filter.send_frame(&mono),
        Err(ShengError::InvalidArgument(_))
    ));
    let ints =
        AudioFrame::from_planes(&[vec![0i16; 16], vec![0; 16]], 48000, ChannelLayout::STEREO)
            .unwrap();
    assert!(matches!(
        filter.send_frame(&ints),
        Err(ShengError::Unsupported(_))
    ));
}

#[test]
fn test_低频分频频点() {
    assert!((lfe_bin(128, 48000, 4096) - 21.845_333_333_333_333).abs() < 1e-9);
    assert!((lfe_bin(256, 48000, 4096) - 43.690_666_666_666_67).abs() < 1e-9);
    assert_eq!(lfe_bin(1000, 32000, 512), 32.0);

    let mut filter = SurroundFilter::new(SurroundConfig {
        win_size: 2048,
        ..Default::default()
    })
    .unwrap();
    let frame =
        AudioFrame::from_planes(&[vec![0.0f64; 64], vec![0.0; 64]], 48000, ChannelLayout::STEREO)
            .unwrap();
    filter.send_frame(&frame).unwrap();
    let Some(EngineKind::F64(e)) = &filter.engine else {
        panic!("f64 输入应建立 f64 引擎");
    };
    assert!((e.lowcut - 10.922_666_666_666_667).abs() < 1e-9, "lowcut = {}", e.lowcut);
    assert!((e.highcut - 21.845_333_333_333_333).abs() < 1e-9, "highcut = {}", e.highcut);
}

#[test]
fn test_左侧内容进入左声道() {
    let (x, y, z) = stereo_position(2.0, 1.0, 0.0, 2.0);
    let pos = (&[x][..], &[y][..], &[z][..]);
    let (mut fl, mut fr) = ([0.0], [0.0]);
    calculate_factors(&ChannelPan::of(Channel::FrontLeft), [2.0; 3], pos, &mut fl);
    calculate_factors(&ChannelPan::of(Channel::FrontRight), [2.0; 3], pos, &mut fr);
    assert!(fl[0] > 3.0 * fr[0], "左侧内容应主要进入左声道: {} vs {}", fl[0], fr[0]);

    // 偏中声道直接取坐标值
    let flc = ChannelPan::of(Channel::FrontLeftOfCenter);
    assert_eq!((flc.x, flc.y, flc.z), (AxisMap::Raw, AxisMap::Raw, AxisMap::Centre));
    assert_eq!(flc.dif_sign, 1.0);
    let mut factor = [0.0f64];
    calculate_factors(&flc, [2.0; 3], pos, &mut factor);
    assert!((factor[0] - (x * y).powi(2)).abs() < 1e-12);
    assert_eq!(ChannelPan::of(Channel::FrontRightOfCenter).dif_sign, -1.0);
}

#[test]
fn test_稳态处理复用缓冲() {
    let mut filter = SurroundFilter::new(small_config("stereo")).unwrap();
    let chunk = noise(200, 21);
    let frame =
        AudioFrame::from_planes(&[chunk.clone(), chunk], 48000, ChannelLayout::STEREO).unwrap();
    let mut buffers = Vec::new();
    for round in 0..20 {
        filter.send_frame(&frame).unwrap();
        while filter.receive_frame().is_ok() {}
        let Some(EngineKind::F64(e)) = &filter.engine else {
            panic!("f64 输入应建立 f64 引擎");
        };
        let now: Vec<_> = e
            .outputs
            .iter()
            .map(|o| (o.hop_out.as_ptr(), o.out.capacity()))
            .collect();
        if round == 4 {
            buffers = now;
        } else if round > 4 {
            assert_eq!(now, buffers, "第 {round} 帧重新分配了输出缓冲");
        }
    }
}
