//! Resolution of server-pack download links from mod-pack pages.
//!
//! Pages are scanned as plain text: the first `href` inside the
//! `<section id="files">` block that points at
//! `/minecraft/modpacks/<slug>/files/<digits>` wins.

const FILES_SECTION_MARKERS: [&str; 2] = ["id=\"files\"", "id='files'"];
const SECTION_CLOSE: &str = "</section>";
const LINK_PREFIX: &str = "/minecraft/modpacks/";
const FILES_SEGMENT: &str = "/files/";

/// Find the server-pack link in `html` and make it absolute against `base_url`.
///
/// Returns `None` when the page has no files section or no matching link.
///
/// # Examples
///
/// ```
/// use mc_runner::artifact::page::resolve_download_link;
///
/// let html = r#"<section id="files"><a href="/minecraft/modpacks/demo/files/4242">x</a></section>"#;
/// assert_eq!(
///     resolve_download_link(html, "https://www.curseforge.com"),
///     Some("https://www.curseforge.com/minecraft/modpacks/demo/files/4242".to_string())
/// );
/// ```
pub fn resolve_download_link(html: &str, base_url: &str) -> Option<String> {
    let section = files_section(html)?;
    hrefs(section)
        .find(|href| is_pack_file_link(href))
        .map(|href| absolute(href, base_url))
}

fn files_section(html: &str) -> Option<&str> {
    let start = FILES_SECTION_MARKERS
        .iter()
        .filter_map(|marker| html.find(marker))
        .min()?;
    let rest = &html[start..];
    let end = rest.find(SECTION_CLOSE).unwrap_or(rest.len());
    Some(&rest[..end])
}

fn hrefs(fragment: &str) -> impl Iterator<Item = &str> {
    fragment.split("href=").skip(1).filter_map(|tail| {
        let quote = tail.chars().next().filter(|c| *c == '"' || *c == '\'')?;
        let value = &tail[1..];
        value.find(quote).map(|end| &value[..end])
    })
}

fn is_pack_file_link(href: &str) -> bool {
    let path = match href.find(LINK_PREFIX) {
        Some(idx) => &href[idx + LINK_PREFIX.len()..],
        None => return false,
    };
    let Some(files_idx) = path.find(FILES_SEGMENT) else {
        return false;
    };
    let slug = &path[..files_idx];
    let id = &path[files_idx + FILES_SEGMENT.len()..];
    let digits = id.chars().take_while(|c| c.is_ascii_digit()).count();
    !slug.is_empty() && digits > 0
}

fn absolute(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), href)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.curseforge.com";

    #[test]
    fn test_resolves_first_matching_link_in_files_section() {
        let html = r#"
<html><body>
<a href="/minecraft/modpacks/outside/files/1">outside</a>
<section class="tabs" id="files">
  <a href="/minecraft/modpacks/demo/relations">relations</a>
  <a href="/minecraft/modpacks/demo/files/5011">Server Pack</a>
  <a href="/minecraft/modpacks/demo/files/5012">Older</a>
</section>
</body></html>"#;

        assert_eq!(
            resolve_download_link(html, BASE),
            Some(format!("{}/minecraft/modpacks/demo/files/5011", BASE))
        );
    }

    #[test]
    fn test_missing_section_yields_none() {
        let html = r#"<a href="/minecraft/modpacks/demo/files/5011">x</a>"#;
        assert_eq!(resolve_download_link(html, BASE), None);
    }

    #[test]
    fn test_section_without_match_yields_none() {
        let html = r#"<section id='files'><a href='/minecraft/modpacks/demo/files/'>x</a><a href="/about">y</a></section>"#;
        assert_eq!(resolve_download_link(html, BASE), None);
    }

    #[test]
    fn test_absolute_links_kept() {
        let html = r#"<section id="files"><a href='https://cdn.example.com/minecraft/modpacks/x/files/9'>x</a></section>"#;
        assert_eq!(
            resolve_download_link(html, BASE),
            Some("https://cdn.example.com/minecraft/modpacks/x/files/9".to_string())
        );
    }
}
