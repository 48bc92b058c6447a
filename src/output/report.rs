// 该文件是 Bingzao （病灶） 项目的一部分。
// src/output/report.rs - 检测结果文字摘要
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

use std::{fmt, sync::Arc};

use crate::model::DetectResult;

pub const NO_LESIONS_MESSAGE: &str = "No lesions detected.";

/// 单条检测摘要
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLine {
  pub index: usize,
  pub class_name: Arc<str>,
  pub confidence: f32,
}

impl fmt::Display for ReportLine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Detection {}: Class {} | Confidence {:.2}",
      self.index, self.class_name, self.confidence
    )
  }
}

/// 检测结果要么是非空列表，要么是“未检测到病灶”
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionReport {
  Detections(Vec<ReportLine>),
  NoLesions,
}

impl From<&DetectResult> for DetectionReport {
  fn from(result: &DetectResult) -> Self {
    if result.is_empty() {
      return DetectionReport::NoLesions;
    }

    let lines = result
      .iter()
      .enumerate()
      .map(|(i, item)| ReportLine {
        index: i + 1,
        class_name: item.label.clone(),
        confidence: item.score,
      })
      .collect();
    DetectionReport::Detections(lines)
  }
}

impl DetectionReport {
  pub fn lines(&self) -> &[ReportLine] {
    match self {
      DetectionReport::Detections(lines) => lines,
      DetectionReport::NoLesions => &[],
    }
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, DetectionReport::NoLesions)
  }
}

impl fmt::Display for DetectionReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DetectionReport::NoLesions => write!(f, "{}", NO_LESIONS_MESSAGE),
      DetectionReport::Detections(lines) => {
        for (i, line) in lines.iter().enumerate() {
          if i > 0 {
            writeln!(f)?;
          }
          write!(f, "{}", line)?;
        }
        Ok(())
      }
    }
  }
}
