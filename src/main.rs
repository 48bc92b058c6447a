// 该文件是 Bingzao （病灶） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use bingzao::{
  FromUrl,
  model::YoloV8Builder,
  output::{HtmlPage, draw::Draw},
  server::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
  bingzao::init_tracing();

  let args = args::Args::parse();

  info!("Bingzao 皮肤病灶检测");
  info!("模型文件路径: {}", args.model);
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.iou);

  // 模型加载失败时直接退出，不对外提供服务
  info!("正在加载模型...");
  let model = YoloV8Builder::from_url(&args.model)?
    .confidence(args.confidence)
    .iou(args.iou)
    .max_detections(args.max_detections)
    .intra_threads(args.intra_threads)
    .build()
    .with_context(|| format!("无法加载模型: {}", args.model))?;
  info!(
    "模型加载完成, 类别数量: {}, 输入尺寸: {:?}",
    model.labels().len(),
    model.input_size()
  );

  let draw = match &args.font {
    Some(path) => Draw::with_font_file(path)
      .with_context(|| format!("无法加载字体: {}", path.display()))?,
    None => {
      warn!("未指定字体, 标注图只绘制检测框");
      Draw::default()
    }
  };

  let state = AppState::new(model, HtmlPage::new(draw))
    .with_max_upload_size(args.max_upload_mb.saturating_mul(1024 * 1024));

  let listener = TcpListener::bind(args.listen)
    .await
    .with_context(|| format!("无法监听地址: {}", args.listen))?;
  server::serve(listener, Arc::new(state)).await?;

  info!("服务已退出");
  Ok(())
}
