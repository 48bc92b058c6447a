// 该文件是 Bingzao （病灶） 项目的一部分。
// src/model/labels.rs - 类别名称表
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

use std::{collections::BTreeMap, sync::Arc};

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum LabelError {
  #[error("类别名称表格式错误: {0}")]
  Malformed(String),
  #[error("类别编号不连续: 缺少 {0}")]
  MissingId(u32),
  #[error("类别名称表为空")]
  Empty,
}

/// 模型自带的类别名称表，编号从 0 开始连续
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
  names: Box<[Arc<str>]>,
}

impl LabelTable {
  pub fn new<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Result<Self, LabelError> {
    let names: Box<[Arc<str>]> = names.into_iter().map(|s| Arc::from(s.as_ref())).collect();
    if names.is_empty() {
      return Err(LabelError::Empty);
    }
    Ok(Self { names })
  }

  /// 解析导出模型元数据中的 `names` 字段，例如
  /// `{0: 'melanoma', 1: 'nevus'}`
  pub fn parse_metadata(text: &str) -> Result<Self, LabelError> {
    let entries: BTreeMap<u32, String> =
      serde_yaml::from_str(text).map_err(|e| LabelError::Malformed(e.to_string()))?;

    for (expected, id) in entries.keys().enumerate() {
      if *id != expected as u32 {
        return Err(LabelError::MissingId(expected as u32));
      }
    }

    Self::new(entries.into_values())
  }

  pub fn get(&self, id: u32) -> Option<&Arc<str>> {
    self.names.get(id as usize)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_python_dict_literal() {
    let table =
      LabelTable::parse_metadata("{0: 'melanoma', 1: 'nevus', 2: \"seborrheic keratosis\"}")
        .unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.get(0).map(|s| &**s), Some("melanoma"));
    assert_eq!(table.get(2).map(|s| &**s), Some("seborrheic keratosis"));
    assert!(table.get(3).is_none());
  }

  #[test]
  fn keeps_commas_and_quotes_inside_names() {
    let table = LabelTable::parse_metadata(r#"{1: 'b, c', 0: "a's", 2: 'it''s'}"#).unwrap();
    assert_eq!(table.get(0).map(|s| &**s), Some("a's"));
    assert_eq!(table.get(1).map(|s| &**s), Some("b, c"));
    assert_eq!(table.get(2).map(|s| &**s), Some("it's"));
  }

  #[test]
  fn decodes_escapes_in_double_quoted_names() {
    let table = LabelTable::parse_metadata(r#"{0: "a\nb", 1: "tab\tbed"}"#).unwrap();
    assert_eq!(table.get(0).map(|s| &**s), Some("a\nb"));
    assert_eq!(table.get(1).map(|s| &**s), Some("tab\tbed"));
  }

  #[test]
  fn rejects_gaps_and_garbage() {
    assert_eq!(
      LabelTable::parse_metadata("{0: 'a', 2: 'c'}"),
      Err(LabelError::MissingId(1))
    );
    assert!(matches!(
      LabelTable::parse_metadata("['a', 'b']"),
      Err(LabelError::Malformed(_))
    ));
    assert!(matches!(
      LabelTable::parse_metadata("{0: 'unterminated}"),
      Err(LabelError::Malformed(_))
    ));
    assert_eq!(LabelTable::parse_metadata("{}"), Err(LabelError::Empty));
  }
}
