//! 分区卷积 FIR 滤镜在滤镜图中的端到端测试.

use sheng::codec::AudioFrame;
use sheng::core::{ChannelLayout, ShengError};
use sheng::filter::{FilterGraph, create_filter};

fn direct_convolution(x: &[f64], h: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; x.len() + h.len() - 1];
    for (i, &xi) in x.iter().enumerate() {
        for (j, &hj) in h.iter().enumerate() {
            y[i + j] += xi * hj;
        }
    }
    y
}

fn decaying_ir(len: usize, freq: f64) -> Vec<f64> {
    (0..len)
        .map(|i| (i as f64 * freq).cos() * (-(i as f64) / 60.0).exp())
        .collect()
}

fn signal(len: usize, seed: u32) -> Vec<f64> {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            (state >> 8) as f64 / (1u32 << 24) as f64 - 0.5
        })
        .collect()
}

/// 分块送入滤镜图并刷新, 返回全部输出帧
fn run_graph(graph: &mut FilterGraph, planes: &[Vec<f64>], chunk: usize) -> Vec<AudioFrame> {
    let layout = ChannelLayout::from_channels(planes.len() as u32);
    let mut frames = Vec::new();
    let mut pos = 0;
    while pos < planes[0].len() {
        let end = (pos + chunk).min(planes[0].len());
        let part: Vec<Vec<f64>> = planes.iter().map(|p| p[pos..end].to_vec()).collect();
        let mut frame = AudioFrame::from_planes(&part, 48000, layout).unwrap();
        frame.pts = 1000 + pos as i64;
        frames.extend(graph.process_frame(&frame).unwrap());
        pos = end;
    }
    frames.extend(graph.flush_all().unwrap());
    frames
}

fn collect(frames: &[AudioFrame], channels: usize) -> Vec<Vec<f64>> {
    let mut out = vec![Vec::new(); channels];
    for frame in frames {
        for (d, s) in out.iter_mut().zip(frame.planes::<f64>().unwrap()) {
            d.extend(s);
        }
    }
    out
}

#[test]
fn test_立体声分区卷积() {
    let hl = decaying_ir(700, 0.11);
    let hr = decaying_ir(700, 0.47);
    let config = serde_json::json!({
        "irs": [[hl, hr]],
        "irnorm": -1.0,
        "minp": 32,
        "maxp": 256,
    });
    let mut graph = FilterGraph::new();
    graph.add_filter(create_filter("afir", &config.to_string()).unwrap());

    let left = signal(3000, 1);
    let right = signal(3000, 2);
    let frames = run_graph(&mut graph, &[left.clone(), right.clone()], 480);
    let out = collect(&frames, 2);

    for (ch, (x, h)) in [(&left, &hl), (&right, &hr)].into_iter().enumerate() {
        let expect = direct_convolution(x, h);
        assert_eq!(out[ch].len(), expect.len(), "声道 {ch} 应包含完整拖尾");
        for (i, (a, b)) in out[ch].iter().zip(&expect).enumerate() {
            assert!((a - b).abs() < 1e-9, "声道 {ch} 采样 {i}: {a} != {b}");
        }
    }
}

#[test]
fn test_输出时间戳连续() {
    let config = serde_json::json!({
        "irs": [[decaying_ir(100, 0.3)]],
        "minp": 16,
        "maxp": 64,
    });
    let mut graph = FilterGraph::new();
    graph.add_filter(create_filter("afir", &config.to_string()).unwrap());
    let frames = run_graph(&mut graph, &[signal(1000, 3)], 123);

    let mut expect_pts = 1000;
    for frame in &frames {
        assert_eq!(frame.pts, expect_pts, "时间戳应按已输出采样数递增");
        assert_eq!(frame.sample_rate, 48000);
        expect_pts += frame.nb_samples as i64;
    }
    assert_eq!(expect_pts - 1000, 1000 + 99, "输出总长为输入加拖尾");
}

#[test]
fn test_单位冲激串联去加重() {
    let input = signal(2000, 4);

    let mut reference = FilterGraph::new();
    reference.add_filter(create_filter("aemphasis", r#"{"type": "riaa"}"#).unwrap());
    let expect = collect(&run_graph(&mut reference, &[input.clone()], 256), 1);

    let mut graph = FilterGraph::new();
    graph.add_filter(
        create_filter("afir", r#"{"irs": [[[1.0]]], "minp": 64, "maxp": 64}"#).unwrap(),
    );
    graph.add_filter(create_filter("aemphasis", r#"{"type": "riaa"}"#).unwrap());
    assert_eq!(graph.filter_names(), vec!["afir", "aemphasis"]);
    let out = collect(&run_graph(&mut graph, &[input], 256), 1);

    assert_eq!(out[0].len(), expect[0].len());
    for (i, (a, b)) in out[0].iter().zip(&expect[0]).enumerate() {
        assert!((a - b).abs() < 1e-9, "采样 {i}: {a} != {b}");
    }
}

#[test]
fn test_干湿增益与归一化() {
    // 系数和归一化 (irnorm=0) 后直流增益为 1, 再乘 dry·wet
    let config = r#"{"irs": [[[1.0, 2.0, 1.0]]], "irnorm": 0.0, "dry": 0.5, "wet": 0.8, "minp": 8, "maxp": 8}"#;
    let mut graph = FilterGraph::new();
    graph.add_filter(create_filter("afir", config).unwrap());
    let out = collect(&run_graph(&mut graph, &[vec![1.0; 64]], 16), 1);
    assert_eq!(out[0].len(), 66);
    for v in &out[0][2..64] {
        assert!((v - 0.4).abs() < 1e-12, "稳态输出应为 0.4: {v}");
    }
}

#[test]
fn test_参数与格式错误() {
    assert!(matches!(
        create_filter("afir", r#"{"irs": [[[1.0]]], "minp": "big"}"#),
        Err(ShengError::InvalidArgument(_))
    ));
    assert!(matches!(
        create_filter("afir", ""),
        Err(ShengError::InvalidArgument(_))
    ));
    assert!(matches!(
        create_filter("convolve", "{}"),
        Err(ShengError::FilterNotFound(_))
    ));

    let mut graph = FilterGraph::new();
    graph.add_filter(create_filter("afir", r#"{"irs": [[[1.0]]]}"#).unwrap());
    let frame = AudioFrame::from_planes(&[vec![0i16; 32]], 48000, ChannelLayout::MONO).unwrap();
    assert!(matches!(
        graph.process_frame(&frame),
        Err(ShengError::Unsupported(_))
    ));
}
