//! Live reload client shared by the template renderer and the dev server.

/// Path of the Server-Sent Events endpoint served by the dev server.
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// JavaScript snippet injected into rendered pages in develop mode.
///
/// With `notify` set the client shows a short toast when it connects and
/// before each reload.
#[must_use]
pub fn client_script(notify: bool) -> String {
    format!(
        r#"<script>
(function() {{
    var notify = {notify};
    function toast(text) {{
        if (!notify) return;
        var el = document.createElement('div');
        el.textContent = text;
        el.style.cssText = 'position:fixed;top:0;right:0;z-index:9999;padding:8px 14px;' +
            'background:#1e293b;color:#f1f5f9;font:13px sans-serif;opacity:.92';
        document.body.appendChild(el);
        setTimeout(function() {{ el.remove(); }}, 1500);
    }}
    var source = new EventSource('{LIVERELOAD_PATH}');
    source.onopen = function() {{ toast('Connected to kiln'); }};
    source.onmessage = function(event) {{
        if (event.data === 'reload') {{
            toast('Reloading...');
            window.location.reload();
        }} else if (event.data === 'css-reload') {{
            toast('Injected CSS');
            document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {{
                var href = link.href.split('?')[0];
                link.href = href + '?v=' + Date.now();
            }});
        }}
    }};
    source.onerror = function() {{
        console.log('[livereload] Connection lost, retrying...');
    }};
}})();
</script>
"#
    )
}

/// Insert the client script before the last `</body>`, or append it when the
/// page has no body end tag. Pages that already carry the client are returned
/// unchanged.
#[must_use]
pub fn inject(html: &str, notify: bool) -> String {
    if html.contains(LIVERELOAD_PATH) {
        return html.to_string();
    }

    let script = client_script(notify);
    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + script.len());
            out.push_str(&html[..pos]);
            out.push_str(&script);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}{script}"),
    }
}
