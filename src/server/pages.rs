// Server-rendered HTML for the public dashboard and the admin area

use crate::dashboard::DashboardRow;
use crate::db::VpsInstance;
use crate::expiry::Severity;

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
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

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
{body}
<footer>VPSight v{version}</footer>
</body>
</html>"#,
        title = escape(title),
        body = body,
        version = crate::VERSION,
    )
}

fn severity_class(severity: Option<Severity>) -> &'static str {
    severity.map_or("none", |s| s.as_str())
}

fn billing_bar(row: &DashboardRow) -> String {
    let progress = row.billing.progress;
    format!(
        r#"<div class="bar"><div class="fill {class}" style="width: {pct:.1}%"></div><span>{pct:.1}%</span></div>"#,
        class = severity_class(progress.severity),
        pct = progress.percentage,
    )
}

fn flash(notice: Option<&str>, error: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(notice) = notice {
        out.push_str(&format!(r#"<p class="notice">{}</p>"#, escape(notice)));
    }
    if let Some(error) = error {
        out.push_str(&format!(r#"<p class="error">{}</p>"#, escape(error)));
    }
    out
}

pub fn index(rows: &[DashboardRow]) -> String {
    let body_rows = if rows.is_empty() {
        r#"<tr><td colspan="8" class="empty">No VPS instances found.</td></tr>"#.to_string()
    } else {
        rows.iter()
            .map(|row| {
                format!(
                    r#"<tr><td><span class="status {status}"></span></td><td>{name}</td><td>{system}</td><td>{region}</td><td>{price}</td><td>{cycle}</td><td class="{class}">{expiry}</td><td>{bar}</td></tr>"#,
                    status = row.status.as_str(),
                    name = escape(&row.name),
                    system = escape(&row.system),
                    region = escape(&row.country_region),
                    price = escape(&row.price),
                    cycle = escape(&row.billing_cycle),
                    class = severity_class(row.billing.progress.severity),
                    expiry = escape(&row.days_to_expiry.label()),
                    bar = billing_bar(row),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    layout(
        "VPSight",
        &format!(
            r#"<header><h1>VPSight</h1><a href="/admin/dashboard">Admin</a></header>
<main>
<table>
<thead><tr><th></th><th>Name</th><th>System</th><th>Location</th><th>Price</th><th>Cycle</th><th>Remaining</th><th>Billing</th></tr></thead>
<tbody>
{}
</tbody>
</table>
</main>"#,
            body_rows
        ),
    )
}

pub fn login(error: Option<&str>, redirect: Option<&str>) -> String {
    let redirect_field = redirect
        .map(|r| format!(r#"<input type="hidden" name="redirect" value="{}">"#, escape(r)))
        .unwrap_or_default();
    layout(
        "Admin Login - VPSight",
        &format!(
            r#"<main class="narrow">
<h1>Admin Login</h1>
{flash}
<form method="post" action="/admin/login">
<label>Username <input name="username" autocomplete="username" required></label>
<label>Password <input name="password" type="password" autocomplete="current-password" required></label>
{redirect_field}
<button type="submit">Log in</button>
</form>
</main>"#,
            flash = flash(None, error),
            redirect_field = redirect_field,
        ),
    )
}

fn note_cell(vps: &VpsInstance) -> String {
    let billing: Vec<String> = [
        ("Start", &vps.billing_start_date),
        ("End", &vps.billing_end_date),
        ("Cycle", &vps.billing_cycle),
        ("Amount", &vps.billing_amount),
    ]
    .iter()
    .filter_map(|(label, value)| {
        value
            .as_ref()
            .map(|v| format!("<p>{}: {}</p>", label, escape(v)))
    })
    .collect();

    let mut plan: Vec<String> = Vec::new();
    if let Some(bandwidth) = &vps.plan_bandwidth {
        plan.push(format!("<p>Bandwidth: {}</p>", escape(bandwidth)));
    }
    if let Some(traffic) = vps.plan_traffic_type {
        plan.push(format!("<p>Traffic: {}</p>", traffic.label()));
    }

    if billing.is_empty() && plan.is_empty() {
        return r#"<span class="muted">N/A</span>"#.to_string();
    }
    let mut out = String::new();
    if !billing.is_empty() {
        out.push_str(&format!("<div><strong>Billing:</strong>{}</div>", billing.concat()));
    }
    if !plan.is_empty() {
        out.push_str(&format!("<div><strong>Plan:</strong>{}</div>", plan.concat()));
    }
    out
}

fn text_input(name: &str, label: &str, kind: &str, placeholder: &str) -> String {
    format!(
        r#"<label>{label} <input name="{name}" type="{kind}" placeholder="{placeholder}"></label>"#,
        label = label,
        name = name,
        kind = kind,
        placeholder = escape(placeholder),
    )
}

fn add_server_form() -> String {
    let fields = [
        text_input("name", "Name *", "text", "e.g., Production Server 1"),
        text_input("type", "Type", "text", "e.g., Premium KVM"),
        text_input("group_name", "Group", "text", "e.g., Web Servers"),
        text_input("country_region", "Country/Region", "text", "e.g., USA / New York"),
        text_input("note_billing_start_date", "Start Date", "date", ""),
        text_input("note_billing_end_date", "End Date", "date", ""),
        text_input("note_billing_cycle", "Cycle", "text", "e.g., Monthly, Annually"),
        text_input("note_billing_amount", "Amount", "text", "e.g., $10.00 USD"),
        text_input("note_plan_bandwidth", "Bandwidth", "text", "e.g., 1TB, 500GB"),
    ]
    .concat();

    format!(
        r#"<form method="post" action="/admin/servers" class="grid">
{fields}
<label>Traffic Type <select name="note_plan_traffic_type">
<option value="0">Both</option><option value="1">Outbound only</option><option value="2">Inbound only</option>
</select></label>
<button type="submit">Add Server</button>
</form>"#,
        fields = fields
    )
}

pub fn admin_dashboard(
    entries: &[(VpsInstance, DashboardRow)],
    notice: Option<&str>,
    error: Option<&str>,
) -> String {
    let body_rows = if entries.is_empty() {
        r#"<tr><td colspan="11" class="empty">No VPS data available.</td></tr>"#.to_string()
    } else {
        entries
            .iter()
            .enumerate()
            .map(|(index, (vps, row))| {
                format!(
                    r#"<tr><td>{n}</td><td>{name}</td><td>{kind}</td><td>{group}</td><td>{ip}</td><td>{agent}</td><td class="secret">{secret}</td><td><code>{install}</code></td><td class="note">{note}</td><td class="{class}">{expiry}</td><td class="actions">
<form method="post" action="/admin/servers/{id}/renew"><button type="submit">Renew</button></form>
<form method="post" action="/admin/servers/{id}/delete" onsubmit="return confirm('Delete {js_name}?')"><button type="submit" class="danger">Delete</button></form>
</td></tr>"#,
                    n = index + 1,
                    id = vps.id,
                    name = escape(&vps.name),
                    js_name = escape(&vps.name.replace('\\', "\\\\").replace('\'', "\\'")),
                    kind = escape(vps.server_type.as_deref().unwrap_or("")),
                    group = escape(vps.group_name.as_deref().unwrap_or("")),
                    ip = escape(vps.ip_address.as_deref().unwrap_or("")),
                    agent = escape(vps.agent_version.as_deref().unwrap_or("")),
                    secret = escape(&vps.secret),
                    install = escape(&vps.install_command),
                    note = note_cell(vps),
                    class = severity_class(row.billing.progress.severity),
                    expiry = escape(&row.days_to_expiry.label()),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    layout(
        "Admin Control Panel - VPSight",
        &format!(
            r#"<header><h1>Admin Control Panel</h1>
<form method="post" action="/admin/logout"><button type="submit">Logout</button></form></header>
<main>
{flash}
<h2>Add Server</h2>
{add_form}
<h2>VPS Control</h2>
<table>
<thead><tr><th>ID</th><th>Name</th><th>Type</th><th>Group</th><th>IP</th><th>Agent Ver.</th><th>Secret</th><th>Install Cmd</th><th>Note</th><th>Remaining</th><th>Action</th></tr></thead>
<tbody>
{rows}
</tbody>
</table>
</main>"#,
            flash = flash(notice, error),
            add_form = add_server_form(),
            rows = body_rows,
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<b a="1">&'"#), "&lt;b a=&quot;1&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_empty_pages() {
        assert!(index(&[]).contains("No VPS instances found."));
        assert!(admin_dashboard(&[], Some("Saved"), None).contains(r#"<p class="notice">Saved</p>"#));
    }

    #[test]
    fn test_login_keeps_redirect_target() {
        let page = login(Some("Invalid username or password."), Some("/admin/servers"));
        assert!(page.contains(r#"name="redirect" value="/admin/servers""#));
        assert!(page.contains("Invalid username or password."));
    }
}
