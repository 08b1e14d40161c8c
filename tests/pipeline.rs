// 该文件是 Kanjian （看见） 项目的一部分。
// tests/pipeline.rs - 双线程流水线测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  convert::Infallible,
  io::Write,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use image::{Rgb, RgbImage};
use thiserror::Error;
use url::Url;

use kanjian::{
  FromUrl,
  frame::{ConvertedBuffer, Frame, PixelEncoding},
  input::{FrameSlot, ImageFileInput},
  model::{BoundingBox, InferenceBridge, InferenceEngine, InferenceResult, ReplayEngine},
  output::{Render, SaveImageFileOutput},
  pipeline::{FramePipeline, FrameState, UiExecutor},
  task::{ContinuousTask, OneShotTask, Task, spawn_task},
  view::{FixedPreview, INFERENCE_ERROR_TEXT, ResultView},
};

#[derive(Error, Debug)]
#[error("engine busy")]
struct Busy;

/// 第 n 次调用返回 n 个框，第二次调用失败
#[derive(Default)]
struct CountingEngine {
  calls: usize,
}

impl InferenceEngine for CountingEngine {
  type Error = Busy;

  fn infer(&mut self, _input: &ConvertedBuffer) -> Result<InferenceResult, Self::Error> {
    self.calls += 1;
    if self.calls == 2 {
      return Err(Busy);
    }
    Ok(InferenceResult {
      object_detections: Some(
        (0..self.calls)
          .map(|i| BoundingBox::new("cat", 0.5, i as i32, 0, 2, 2))
          .collect(),
      ),
      ..Default::default()
    })
  }
}

/// 第一次返回越界的框，之后返回正常的框
#[derive(Default)]
struct OutOfRangeEngine {
  calls: usize,
}

impl InferenceEngine for OutOfRangeEngine {
  type Error = Busy;

  fn infer(&mut self, _input: &ConvertedBuffer) -> Result<InferenceResult, Self::Error> {
    self.calls += 1;
    let bbox = if self.calls == 1 {
      BoundingBox::new("cat", 0.5, i32::MAX - 1, 0, 10, 10)
    } else {
      BoundingBox::new("cat", 0.5, 2, 2, 8, 8)
    };
    Ok(InferenceResult {
      object_detections: Some(vec![bbox]),
      ..Default::default()
    })
  }
}

#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
  overlay_visible: bool,
  boxes: usize,
  text_visible: bool,
  text: String,
}

#[derive(Clone, Default)]
struct Recorder {
  snapshots: Arc<Mutex<Vec<Snapshot>>>,
}

impl Render for Recorder {
  type Error = Infallible;

  fn render_view(&mut self, view: &ResultView) -> Result<(), Self::Error> {
    self.snapshots.lock().unwrap().push(Snapshot {
      overlay_visible: view.overlay().is_visible(),
      boxes: view.overlay().boxes().len(),
      text_visible: view.text().is_visible(),
      text: view.text().text().to_string(),
    });
    Ok(())
  }
}

fn rgb_frame(width: u32, height: u32) -> Frame {
  Frame::new(
    vec![0u8; (width * height * 3) as usize],
    width,
    height,
    PixelEncoding::Rgb888,
  )
}

fn preview() -> FixedPreview {
  FixedPreview {
    width: 16,
    height: 16,
  }
}

#[test]
fn results_render_in_capture_order() {
  let recorder = Recorder::default();
  let (ui, ui_join) = UiExecutor::spawn(ResultView::default(), recorder.clone(), preview()).unwrap();
  let pipeline = FramePipeline::new(InferenceBridge::new(CountingEngine::default()), ui);
  let stats = pipeline.stats().clone();

  let frames = vec![rgb_frame(2, 2), rgb_frame(0, 0), rgb_frame(2, 2), rgb_frame(2, 2)];
  let worker = spawn_task(ContinuousTask::default(), frames.into_iter(), pipeline).unwrap();
  worker.join().unwrap().unwrap();
  let view = ui_join.join().unwrap();

  let snapshots = recorder.snapshots.lock().unwrap().clone();
  assert_eq!(snapshots.len(), 3);
  assert_eq!((snapshots[0].overlay_visible, snapshots[0].boxes), (true, 1));
  assert!(!snapshots[0].text_visible);
  assert!(!snapshots[1].overlay_visible);
  assert!(snapshots[1].text_visible);
  assert_eq!(snapshots[1].text, INFERENCE_ERROR_TEXT);
  assert_eq!((snapshots[2].overlay_visible, snapshots[2].boxes), (true, 3));

  let stats = stats.snapshot();
  assert_eq!(stats.captured, 4);
  assert_eq!(stats.dropped, 1);
  assert_eq!(stats.inferred, 3);
  assert_eq!(stats.unavailable, 1);
  assert_eq!(stats.rendered, 3);
  assert_eq!(view.overlay().draw_area(), Some((16, 16)));
}

#[test]
fn frame_limit_and_stop_flag_end_the_loop() {
  let (ui, ui_join) = UiExecutor::spawn(ResultView::default(), Recorder::default(), preview()).unwrap();
  let pipeline = FramePipeline::new(InferenceBridge::new(CountingEngine::default()), ui);
  let stats = pipeline.stats().clone();
  let frames = std::iter::repeat_with(|| rgb_frame(2, 2));
  ContinuousTask::default()
    .with_frame_number(Some(5))
    .run_task(frames, pipeline)
    .unwrap();
  ui_join.join().unwrap();
  assert_eq!(stats.snapshot().captured, 5);

  let (ui, ui_join) = UiExecutor::spawn(ResultView::default(), Recorder::default(), preview()).unwrap();
  let pipeline = FramePipeline::new(InferenceBridge::new(CountingEngine::default()), ui);
  let stats = pipeline.stats().clone();
  let stop = Arc::new(AtomicBool::new(true));
  let frames = std::iter::repeat_with(|| rgb_frame(2, 2));
  ContinuousTask::default()
    .with_stop(stop)
    .run_task(frames, pipeline)
    .unwrap();
  ui_join.join().unwrap();
  assert_eq!(stats.snapshot().captured, 0);

  let (ui, ui_join) = UiExecutor::spawn(ResultView::default(), Recorder::default(), preview()).unwrap();
  let pipeline = FramePipeline::new(InferenceBridge::new(CountingEngine::default()), ui);
  let stats = pipeline.stats().clone();
  let pulled = Arc::new(AtomicUsize::new(0));
  let counter = pulled.clone();
  let frames = std::iter::repeat_with(move || {
    counter.fetch_add(1, Ordering::SeqCst);
    rgb_frame(2, 2)
  });
  ContinuousTask::default()
    .with_frame_number(Some(0))
    .run_task(frames, pipeline)
    .unwrap();
  ui_join.join().unwrap();
  assert_eq!(stats.snapshot().captured, 0);
  assert_eq!(pulled.load(Ordering::SeqCst), 0);
}

#[test]
fn out_of_range_boxes_keep_the_ui_alive() {
  let recorder = Recorder::default();
  let (ui, ui_join) = UiExecutor::spawn(ResultView::default(), recorder.clone(), preview()).unwrap();
  let mut pipeline = FramePipeline::new(InferenceBridge::new(OutOfRangeEngine::default()), ui);
  let stats = pipeline.stats().clone();

  assert_eq!(pipeline.process(rgb_frame(2, 2)), FrameState::Inferred);
  assert_eq!(pipeline.process(rgb_frame(2, 2)), FrameState::Inferred);
  drop(pipeline);
  let view = ui_join.join().unwrap();

  assert_eq!(recorder.snapshots.lock().unwrap().len(), 2);
  assert_eq!(stats.snapshot().rendered, 2);
  assert_eq!(view.overlay().boxes()[0].x, 2);
}

#[test]
fn mailbox_fed_pipeline_releases_every_frame() {
  let released = Arc::new(AtomicUsize::new(0));
  let slot = FrameSlot::new();

  let (ui, ui_join) = UiExecutor::spawn(ResultView::default(), Recorder::default(), preview()).unwrap();
  let pipeline = FramePipeline::new(InferenceBridge::new(CountingEngine::default()), ui);
  let stats = pipeline.stats().clone();
  let worker = spawn_task(ContinuousTask::default(), slot.frames(), pipeline).unwrap();

  const PUSHED: usize = 50;
  let mut replaced = 0;
  for _ in 0..PUSHED {
    let released = released.clone();
    let frame = rgb_frame(2, 2).with_release(move || {
      released.fetch_add(1, Ordering::SeqCst);
    });
    if slot.push(frame) {
      replaced += 1;
    }
  }
  slot.close();

  worker.join().unwrap().unwrap();
  ui_join.join().unwrap();

  let stats = stats.snapshot();
  assert_eq!(released.load(Ordering::SeqCst), PUSHED);
  assert_eq!(stats.captured as usize + replaced, PUSHED);
  assert_eq!(stats.rendered + stats.superseded, stats.inferred);
}

#[test]
fn oneshot_replay_writes_anomaly_summary() {
  let dir = tempfile::tempdir().unwrap();

  let image_path = dir.path().join("still.png");
  RgbImage::from_pixel(4, 2, Rgb([10, 20, 30]))
    .save(&image_path)
    .unwrap();

  let replay_path = dir.path().join("results.jsonl");
  let mut replay = std::fs::File::create(&replay_path).unwrap();
  writeln!(
    replay,
    r#"{{"visual_anomaly_grid_cells":[{{"label":"anomaly","confidence":0.83,"x":0,"y":0,"width":8,"height":8}}],"anomaly_result":{{"anomaly":4.5,"mean":1.0,"max":4.5}}}}"#
  )
  .unwrap();
  drop(replay);

  let input = ImageFileInput::from_url(&Url::parse(&format!("image://{}", image_path.display())).unwrap()).unwrap();
  let engine = ReplayEngine::from_url(&Url::parse(&format!("replay://{}", replay_path.display())).unwrap()).unwrap();

  let output_path = dir.path().join("out/overlay.png");
  let output = SaveImageFileOutput::new(&output_path);
  let (ui, ui_join) = UiExecutor::spawn(ResultView::default(), output, preview()).unwrap();

  // 旋转后为 2x4
  let bridge = InferenceBridge::new(engine).with_expected_input(Some((2, 4)));
  let mut pipeline = FramePipeline::new(bridge, ui);
  let mut input = input;
  let frame = input.next().unwrap();
  assert_eq!(pipeline.process(frame), FrameState::Inferred);
  drop(pipeline);
  let view = ui_join.join().unwrap();

  assert!(view.text().is_visible());
  assert!(!view.overlay().is_visible());
  assert_eq!(
    std::fs::read_to_string(output_path.with_extension("txt")).unwrap(),
    "Anomaly score:\n4.5"
  );
  let saved = image::open(&output_path).unwrap().to_rgba8();
  assert!(saved.pixels().all(|p| p[3] == 0));
}

#[test]
fn oneshot_task_rejects_empty_input() {
  let (ui, ui_join) = UiExecutor::spawn(ResultView::default(), Recorder::default(), preview()).unwrap();
  let pipeline = FramePipeline::new(InferenceBridge::new(CountingEngine::default()), ui);
  let result = OneShotTask.run_task(std::iter::empty::<Frame>(), pipeline);
  assert!(result.is_err());
  ui_join.join().unwrap();
}
