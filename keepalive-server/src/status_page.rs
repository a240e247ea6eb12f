//! HTML status page served at `/`

use keepalive::monitor::shanghai_time;
use keepalive::{AppStatus, RegionCode};

const LOGIN_URL: &str = "https://account.hanatrial.ondemand.com/";

fn region_name(region: Option<RegionCode>) -> &'static str {
    match region {
        Some(RegionCode::Us) => "United States",
        Some(RegionCode::Ap) => "Singapore",
        None => "Unknown",
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn status_card(app: &AppStatus) -> String {
    let (class, label) = if app.healthy {
        ("status-up", "Running")
    } else {
        ("status-down", "Stopped")
    };
    let name = escape_html(&app.app);
    let url = escape_html(&app.url);
    format!(
        r#"
    <div class="status-card {class}">
      <div class="card-header">
        <h3>{name}</h3>
        <span class="status-indicator {class}">{label}</span>
      </div>
      <div class="card-body">
        <p>Region: {region}</p>
        <p>Memory: {memory}</p>
        <p>Disk: {disk}</p>
        <p>Org: {org}</p>
        <p>Space: {space}</p>
      </div>
      <div class="card-footer">
        <button class="btn-restart" data-app="{name}" data-url="{url}" onclick="manualRestart(this)">Restart</button>
        <a href="{url}" target="_blank" class="btn-visit">Open app</a>
      </div>
    </div>"#,
        region = region_name(app.region),
        memory = escape_html(&app.memory),
        disk = escape_html(&app.disk),
        org = escape_html(&app.org),
        space = escape_html(&app.space),
    )
}

/// Render the page; an empty list renders the "nothing configured" variant.
pub fn render(apps: &[AppStatus]) -> String {
    let cards = if apps.is_empty() {
        r#"<p class="empty">No application configured. Set APP_URLS to start monitoring.</p>"#.to_string()
    } else {
        apps.iter().map(status_card).collect::<String>()
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>SAP Cloud keepalive</title>
  <style>
    body {{ font-family: sans-serif; background: #f4f6fb; margin: 0; padding: 24px; }}
    .status-grid {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(300px, 1fr)); gap: 16px; }}
    .status-card {{ background: #fff; border-radius: 8px; padding: 16px; border-top: 4px solid #ccc; }}
    .status-card.status-up {{ border-top-color: #2e9d5b; }}
    .status-card.status-down {{ border-top-color: #d64545; }}
    .card-header {{ display: flex; justify-content: space-between; align-items: center; }}
    .status-indicator.status-up {{ color: #2e9d5b; }}
    .status-indicator.status-down {{ color: #d64545; }}
    .card-footer {{ display: flex; gap: 8px; margin-top: 12px; }}
    .footer {{ margin-top: 24px; color: #777; font-size: 0.9em; }}
  </style>
</head>
<body>
  <h1>SAP Cloud app monitor</h1>
  <div class="controls">
    <button onclick="location.reload()">Refresh</button>
    <a href="{LOGIN_URL}" target="_blank">SAP BTP login</a>
  </div>
  <div class="status-grid">{cards}
  </div>
  <div class="footer">Last updated: {time} (Asia/Shanghai)</div>
  <script>
    function manualRestart(button) {{
      const appName = button.dataset.app;
      const appUrl = button.dataset.url;
      if (!confirm(`Restart ${{appName}}?`)) return;
      fetch(`/webhook/restart?appUrl=${{encodeURIComponent(appUrl)}}`)
        .then(response => response.json())
        .then(data => alert(data.ok ? data.msg : `Restart request failed: ${{data.error}}`))
        .catch(error => alert(`Restart request failed: ${{error}}`));
    }}
  </script>
</body>
</html>
"#,
        time = shanghai_time(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(healthy: bool) -> AppStatus {
        AppStatus {
            app: "shop".to_string(),
            url: "https://shop.cfapps.ap21.hana.ondemand.com".to_string(),
            healthy,
            region: Some(RegionCode::Ap),
            org: "trial".to_string(),
            space: "dev".to_string(),
            memory: "256 MB".to_string(),
            disk: "N/A".to_string(),
        }
    }

    #[test]
    fn test_render_cards() {
        let html = render(&[status(true), status(false)]);
        assert!(html.contains("Singapore"));
        assert!(html.contains("256 MB"));
        assert!(html.contains(r#"data-url="https://shop.cfapps.ap21.hana.ondemand.com""#));
        assert_eq!(html.matches("status-card status-up").count(), 1);
        assert_eq!(html.matches("status-card status-down").count(), 1);
    }

    #[test]
    fn test_render_empty() {
        let html = render(&[]);
        assert!(html.contains("APP_URLS"));
        assert!(!html.contains("btn-restart"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }
}
