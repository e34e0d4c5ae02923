// 该文件是 Pilah 项目的一部分。
// src/task.rs - 任务编排
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
  sync::mpsc,
  thread,
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::PixelBuffer,
  model::{DetectResult, Model},
  output::{AnnotateError, Annotator, Render},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 只处理第一帧
pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
    info!("渲染完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(1500);

/// 距离上一次提交不足 `interval` 的帧直接丢弃
#[derive(Debug, Clone)]
pub struct FrameThrottle {
  interval: Duration,
  last: Option<Instant>,
}

impl Default for FrameThrottle {
  fn default() -> Self {
    FrameThrottle::new(DEFAULT_THROTTLE_INTERVAL)
  }
}

impl FrameThrottle {
  pub fn new(interval: Duration) -> Self {
    Self {
      interval,
      last: None,
    }
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }

  /// 允许提交时记录提交时刻并返回 `true`
  pub fn try_acquire(&mut self, now: Instant) -> bool {
    match self.last {
      Some(last) if now.saturating_duration_since(last) < self.interval => false,
      _ => {
        self.last = Some(now);
        true
      }
    }
  }
}

#[derive(Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  throttle: FrameThrottle,
  handle_interrupt: bool,
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self {
      frame_number: None,
      throttle: FrameThrottle::default(),
      handle_interrupt: true,
    }
  }
}

impl ContinuousTask {
  /// 最多提交的帧数
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_throttle(mut self, throttle: FrameThrottle) -> Self {
    self.throttle = throttle;
    self
  }

  pub fn with_interrupt(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }

  fn interrupt_channel(&self) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel();
    if !self.handle_interrupt {
      return rx;
    }

    let registered = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    });
    if let Err(e) = registered {
      warn!("无法注册中断处理: {}", e);
    }
    rx
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(mut self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!(
      "开始任务... (提交间隔 {:.2?})",
      self.throttle.interval()
    );
    let interrupt = self.interrupt_channel();

    let mut submitted = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for frame in input {
      if interrupt.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if !self.throttle.try_acquire(Instant::now()) {
        skipped += 1;
        continue;
      }

      submitted += 1;
      info!("处理第 {} 帧图像 (已跳过 {} 帧)", submitted, skipped);
      let now = Instant::now();
      match model.infer(&frame) {
        Ok(result) => {
          let elapsed_a = now.elapsed();
          match output.render_result(&frame, &result) {
            Ok(()) => {
              let elapsed_b = now.elapsed();
              info!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);
            }
            Err(e) => {
              failed += 1;
              error!("第 {} 帧渲染失败: {}", submitted, e);
            }
          }
        }
        Err(e) => {
          failed += 1;
          error!("第 {} 帧推理失败: {}", submitted, e);
        }
      }

      // 单帧失败只记录，继续处理后续帧
      if self.frame_number.is_some_and(|n| submitted >= n) {
        info!("达到指定帧数 {}, 退出任务循环", submitted);
        break;
      }
    }

    info!(
      "任务完成，共处理 {} 帧，跳过 {} 帧，失败 {} 帧",
      submitted, skipped, failed
    );
    Ok(())
  }
}

/// 一次检测的完整结果：原图、标注图与检测列表
#[derive(Debug, Clone)]
pub struct AnnotatedResult {
  pub original: PixelBuffer,
  pub annotated: PixelBuffer,
  pub detections: DetectResult,
}

#[derive(Error, Debug)]
pub enum HandoffError {
  #[error("结果已投递，不能重复投递")]
  AlreadyDelivered,
  #[error("结果接收端已关闭")]
  Disconnected,
  #[error("标注失败: {0}")]
  Annotate(#[from] AnnotateError),
}

/// 结果投递端，作为输出使用时先标注再投递
pub struct ResultSender {
  tx: mpsc::SyncSender<AnnotatedResult>,
  annotator: Annotator<'static>,
}

impl ResultSender {
  pub fn deliver(&self, result: AnnotatedResult) -> Result<(), HandoffError> {
    self.tx.try_send(result).map_err(|e| match e {
      mpsc::TrySendError::Full(_) => HandoffError::AlreadyDelivered,
      mpsc::TrySendError::Disconnected(_) => HandoffError::Disconnected,
    })
  }
}

impl Render<PixelBuffer, DetectResult> for ResultSender {
  type Error = HandoffError;

  fn render_result(&self, frame: &PixelBuffer, result: &DetectResult) -> Result<(), Self::Error> {
    let detections = result.normalized();
    let annotated = self.annotator.annotate(frame, &detections.items)?;
    debug!("投递检测结果: {} 个物体", detections.len());
    self.deliver(AnnotatedResult {
      original: frame.clone(),
      annotated,
      detections,
    })
  }
}

/// 结果接收端，`take` 取走后即清空
pub struct ResultReceiver {
  rx: mpsc::Receiver<AnnotatedResult>,
}

impl ResultReceiver {
  pub fn take(&self) -> Option<AnnotatedResult> {
    self.rx.try_recv().ok()
  }

  /// 等待投递端给出结果；投递端未投递就关闭时返回 `None`
  pub fn wait(&self) -> Option<AnnotatedResult> {
    self.rx.recv().ok()
  }
}

/// 在两个阶段之间传递一次检测结果
pub fn handoff(annotator: Annotator<'static>) -> (ResultSender, ResultReceiver) {
  let (tx, rx) = mpsc::sync_channel(1);
  (ResultSender { tx, annotator }, ResultReceiver { rx })
}

#[cfg(test)]
mod tests {
  use std::cell::{Cell, RefCell};

  use super::*;
  use crate::model::{BoundingBox, Detection};

  #[derive(Debug, Error)]
  #[error("模拟错误")]
  struct FakeError;

  struct FakeModel {
    calls: Cell<usize>,
  }

  impl Model for FakeModel {
    type Input = PixelBuffer;
    type Output = DetectResult;
    type Error = FakeError;

    fn infer(&self, _input: &PixelBuffer) -> Result<DetectResult, FakeError> {
      self.calls.set(self.calls.get() + 1);
      Ok(DetectResult::from(vec![Detection {
        class_name: "Organic Waste".to_string(),
        confidence: 0.75,
        bbox: BoundingBox::new(0.2, 0.2, 0.8, 0.8),
      }]))
    }
  }

  #[derive(Default)]
  struct CollectOutput {
    seen: RefCell<Vec<usize>>,
  }

  impl Render<PixelBuffer, DetectResult> for &CollectOutput {
    type Error = FakeError;

    fn render_result(&self, _frame: &PixelBuffer, result: &DetectResult) -> Result<(), FakeError> {
      self.seen.borrow_mut().push(result.len());
      Ok(())
    }
  }

  fn frames(n: usize) -> impl Iterator<Item = PixelBuffer> {
    (0..n).map(|_| PixelBuffer::filled(8, 8, [0, 0, 0, 255]).unwrap())
  }

  #[test]
  fn throttle_skips_frames_inside_interval() {
    let mut throttle = FrameThrottle::default();
    let start = Instant::now();
    assert!(throttle.try_acquire(start));
    assert!(!throttle.try_acquire(start + Duration::from_millis(500)));
    assert!(!throttle.try_acquire(start + Duration::from_millis(1499)));
    assert!(throttle.try_acquire(start + Duration::from_millis(1500)));
    assert!(!throttle.try_acquire(start + Duration::from_millis(2000)));
  }

  #[test]
  fn continuous_task_submits_throttled_frames() {
    let model = FakeModel { calls: Cell::new(0) };
    let output = CollectOutput::default();

    ContinuousTask::default()
      .with_interrupt(false)
      .run_task(frames(5), &model, &output)
      .unwrap();

    // 帧瞬间到达，只有第一帧能提交
    assert_eq!(model.calls.get(), 1);
    assert_eq!(*output.seen.borrow(), vec![1]);
  }

  #[test]
  fn continuous_task_honors_frame_number() {
    let model = FakeModel { calls: Cell::new(0) };
    let output = CollectOutput::default();

    ContinuousTask::default()
      .with_interrupt(false)
      .with_throttle(FrameThrottle::new(Duration::ZERO))
      .with_frame_number(Some(3))
      .run_task(frames(10), &model, &output)
      .unwrap();

    assert_eq!(model.calls.get(), 3);
  }

  /// 第一次调用失败，之后正常
  struct FlakyModel {
    calls: Cell<usize>,
  }

  impl Model for FlakyModel {
    type Input = PixelBuffer;
    type Output = DetectResult;
    type Error = FakeError;

    fn infer(&self, _input: &PixelBuffer) -> Result<DetectResult, FakeError> {
      self.calls.set(self.calls.get() + 1);
      if self.calls.get() == 1 {
        return Err(FakeError);
      }
      Ok(DetectResult::default())
    }
  }

  struct FailingOutput {
    calls: Cell<usize>,
  }

  impl Render<PixelBuffer, DetectResult> for &FailingOutput {
    type Error = FakeError;

    fn render_result(&self, _frame: &PixelBuffer, _result: &DetectResult) -> Result<(), FakeError> {
      self.calls.set(self.calls.get() + 1);
      Err(FakeError)
    }
  }

  #[test]
  fn continuous_task_survives_inference_errors() {
    let model = FlakyModel { calls: Cell::new(0) };
    let output = CollectOutput::default();

    ContinuousTask::default()
      .with_interrupt(false)
      .with_throttle(FrameThrottle::new(Duration::ZERO))
      .run_task(frames(5), &model, &output)
      .unwrap();

    assert_eq!(model.calls.get(), 5);
    assert_eq!(*output.seen.borrow(), vec![0, 0, 0, 0]);
  }

  #[test]
  fn continuous_task_survives_render_errors() {
    let model = FakeModel { calls: Cell::new(0) };
    let output = FailingOutput { calls: Cell::new(0) };

    ContinuousTask::default()
      .with_interrupt(false)
      .with_throttle(FrameThrottle::new(Duration::ZERO))
      .with_frame_number(Some(3))
      .run_task(frames(5), &model, &output)
      .unwrap();

    assert_eq!(model.calls.get(), 3);
    assert_eq!(output.calls.get(), 3);
  }

  #[test]
  fn one_shot_hands_result_over_once() {
    let model = FakeModel { calls: Cell::new(0) };
    let (sender, receiver) = handoff(Annotator::new().unwrap());

    OneShotTask.run_task(frames(2), &model, sender).unwrap();

    let result = receiver.take().unwrap();
    assert_eq!(result.detections.len(), 1);
    assert_eq!(result.original.width(), result.annotated.width());
    assert!(receiver.take().is_none());
  }

  #[test]
  fn second_delivery_is_rejected() {
    let (sender, receiver) = handoff(Annotator::new().unwrap());
    let frame = PixelBuffer::filled(4, 4, [0, 0, 0, 255]).unwrap();

    sender.render_result(&frame, &DetectResult::default()).unwrap();
    assert!(matches!(
      sender.render_result(&frame, &DetectResult::default()),
      Err(HandoffError::AlreadyDelivered)
    ));
    assert!(receiver.take().is_some());
    drop(receiver);
    assert!(matches!(
      sender.render_result(&frame, &DetectResult::default()),
      Err(HandoffError::Disconnected)
    ));
  }
}
