//! Deterministic HTML to plain-text normalization.

use scraper::{ElementRef, Html, Node, Selector};

/// Elements whose text never reaches the output.
const SKIPPED: [&str; 5] = ["script", "style", "nav", "header", "footer"];

/// Elements that begin and end a line.
const BLOCKS: [&str; 29] = [
    "address", "article", "aside", "blockquote", "caption", "dd", "div", "dl", "dt",
    "figcaption", "figure", "form", "h1", "h2", "h3", "h4", "h5", "h6", "li", "main", "ol",
    "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Convert an HTML document to line-oriented text.
///
/// Drops script/style/nav/header/footer subtrees, breaks lines at block
/// elements and `<br>`, trims every line, and removes blank lines.
pub fn to_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let body_sel = Selector::parse("body").expect("valid selector");
    let root = doc
        .select(&body_sel)
        .next()
        .unwrap_or_else(|| doc.root_element());

    let mut raw = String::new();
    collect_text(root, &mut raw);

    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let name = child_el.value().name();
                if SKIPPED.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let block = BLOCKS.contains(&name);
                if block {
                    out.push('\n');
                }
                collect_text(child_el, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_chrome_and_scripts() {
        let html = r#"<html><head><title>1호관</title><style>p{color:red}</style></head>
        <body>
          <header><h1>대학교 홈페이지</h1></header>
          <nav><a href="/">홈</a><a href="/map">캠퍼스맵</a></nav>
          <main>
            <h2>1호관 안내</h2>
            <p>사무실 위치는 2층입니다</p>
            <script>window.analytics = {};</script>
          </main>
          <footer>Copyright 2024</footer>
        </body></html>"#;

        let text = to_text(html);
        assert_eq!(text, "1호관 안내\n사무실 위치는 2층입니다");
    }

    #[test]
    fn trims_and_drops_blank_lines() {
        let html = "<body>\n   첫 줄   \n\n\n\t둘째 줄\n   \n</body>";
        assert_eq!(to_text(html), "첫 줄\n둘째 줄");
    }

    #[test]
    fn minified_blocks_become_lines() {
        let html = "<body><div><p>행정실</p><p>월-금 09:00-18:00</p></div><ul><li>101호</li><li>102호</li></ul>전화<br>02-123-4567</body>";
        assert_eq!(
            to_text(html),
            "행정실\n월-금 09:00-18:00\n101호\n102호\n전화\n02-123-4567"
        );
    }

    #[test]
    fn inline_elements_stay_on_one_line() {
        let html = "<body><p>열람실은 <strong>3층</strong>에 있습니다</p></body>";
        assert_eq!(to_text(html), "열람실은 3층에 있습니다");
    }

    #[test]
    fn table_cells_split_lines() {
        let html = "<table><tr><th>층</th><td>시설</td></tr><tr><td>1층</td><td>학생식당</td></tr></table>";
        assert_eq!(to_text(html), "층\n시설\n1층\n학생식당");
    }

    #[test]
    fn empty_document_yields_empty_text() {
        assert_eq!(to_text(""), "");
        assert_eq!(to_text("<body><script>x()</script></body>"), "");
    }

    #[test]
    fn deterministic() {
        let html = "<body><p>a</p><nav>b</nav><p>c</p></body>";
        assert_eq!(to_text(html), to_text(html));
    }
}
