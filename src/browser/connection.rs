use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult};

/// 连接到已打开的浏览器并获取 Moodle 页面
///
/// 优先复用地址包含 `url_pattern` 的标签页；找不到时新开一个页面并导航到 `target_url`。
pub async fn connect_to_browser_and_page(
    port: u16,
    target_url: &str,
    url_pattern: &str,
) -> AppResult<(Browser, Page)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);
    debug!("目标 URL: {}, 匹配片段: {}", target_url, url_pattern);

    let (browser, mut handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::browser_connection_failed(port, e)
    })?;
    debug!("浏览器连接成功");

    // 在后台处理浏览器事件
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(tokio::time::Duration::from_millis(300)).await;

    let pages = browser.pages().await?;
    debug!("获取到 {} 个页面", pages.len());

    for p in pages.iter() {
        if let Ok(Some(url)) = p.url().await {
            debug!("检查页面地址: {}", url);
            if url.contains(url_pattern) {
                info!("✓ 找到 Moodle 页面: {}", url);
                return Ok((browser, p.clone()));
            }
        }
    }
    debug!("未找到匹配的页面，将创建新页面");

    let page = browser.new_page("about:blank").await.map_err(|e| {
        error!("创建新页面失败: {}", e);
        e
    })?;
    page.goto(target_url).await.map_err(|e| {
        error!("导航到 {} 失败: {}", target_url, e);
        AppError::navigation_failed(target_url, e)
    })?;
    info!("已导航到: {}", target_url);

    Ok((browser, page))
}
