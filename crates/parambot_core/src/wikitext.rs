use crate::block::ParameterBlock;

/// Layout of a template instance as found on the page, reused when the
/// edited block is rendered back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceStyle {
    pub multiline: bool,
    pub space_after_pipe: bool,
    pub space_before_eq: bool,
    pub space_after_eq: bool,
}

/// One located `{{...}}` instance: the byte span it occupies in the page
/// text, its parameter block, and the layout to render it back in.
#[derive(Debug, Clone)]
pub struct TemplateInstance {
    pub name: String,
    pub block: ParameterBlock,
    pub style: InstanceStyle,
    start: usize,
    end: usize,
}

impl TemplateInstance {
    pub fn span(&self) -> (usize, usize) {
        (self.start, self.end)
    }
}

/// Locate the first instance of the named template in the page text.
///
/// Brace matching honors nested `{{...}}`; parameter splitting additionally
/// honors `[[...]]` so piped links do not break values apart. Anything
/// beyond the one parameter block stays unparsed.
pub fn find_template(text: &str, template_name: &str) -> Option<TemplateInstance> {
    let wanted = normalize_template_name(template_name);
    let mut search_from = 0;

    while let Some(relative) = text[search_from..].find("{{") {
        let start = search_from + relative;
        search_from = start + 2;

        let Some(end) = matching_close(text, start) else {
            continue;
        };
        let inner = &text[start + 2..end - 2];
        let (name_chunk, params_raw) = match split_top_level(inner).split_first() {
            Some((name, params)) => (*name, params.to_vec()),
            None => continue,
        };
        if normalize_template_name(name_chunk) != wanted {
            continue;
        }

        let style = detect_style(inner, &params_raw);
        let block = parse_params(&params_raw);
        return Some(TemplateInstance {
            name: name_chunk.trim().to_string(),
            block,
            style,
            start,
            end,
        });
    }

    None
}

pub fn contains_template(text: &str, template_name: &str) -> bool {
    find_template(text, template_name).is_some()
}

/// Render the edited block back in the instance's layout and splice it
/// into the page text. One string replacement, so the page is either the
/// old text or the fully edited text, never something in between.
pub fn replace_template(text: &str, instance: &TemplateInstance, block: &ParameterBlock) -> String {
    let mut out = String::with_capacity(text.len() + 64);
    out.push_str(&text[..instance.start]);
    out.push_str(&render_template(&instance.name, block, instance.style));
    out.push_str(&text[instance.end..]);
    out
}

pub fn render_template(name: &str, block: &ParameterBlock, style: InstanceStyle) -> String {
    let pipe = if style.space_after_pipe { "| " } else { "|" };
    let eq = match (style.space_before_eq, style.space_after_eq) {
        (true, true) => " = ",
        (true, false) => " =",
        (false, true) => "= ",
        (false, false) => "=",
    };

    let mut out = String::from("{{");
    out.push_str(name);
    for entry in block.entries() {
        if style.multiline {
            out.push('\n');
        }
        out.push_str(pipe);
        out.push_str(&entry.name);
        out.push_str(eq);
        out.push_str(entry.value.trim());
    }
    if style.multiline {
        out.push('\n');
    }
    out.push_str("}}");
    out
}

/// Byte offset just past the `}}` matching the `{{` at `start`.
fn matching_close(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut index = start;
    while index + 1 < bytes.len() {
        if bytes[index] == b'{' && bytes[index + 1] == b'{' {
            depth += 1;
            index += 2;
        } else if bytes[index] == b'}' && bytes[index + 1] == b'}' {
            depth -= 1;
            index += 2;
            if depth == 0 {
                return Some(index);
            }
        } else {
            index += 1;
        }
    }
    None
}

/// Split template innards on `|` at nesting depth zero. The first chunk is
/// the template name.
fn split_top_level(inner: &str) -> Vec<&str> {
    let bytes = inner.as_bytes();
    let mut chunks = Vec::new();
    let mut brace_depth = 0usize;
    let mut bracket_depth = 0usize;
    let mut chunk_start = 0usize;
    let mut index = 0usize;

    while index < bytes.len() {
        if index + 1 < bytes.len() && bytes[index] == b'{' && bytes[index + 1] == b'{' {
            brace_depth += 1;
            index += 2;
        } else if index + 1 < bytes.len() && bytes[index] == b'}' && bytes[index + 1] == b'}' {
            brace_depth = brace_depth.saturating_sub(1);
            index += 2;
        } else if index + 1 < bytes.len() && bytes[index] == b'[' && bytes[index + 1] == b'[' {
            bracket_depth += 1;
            index += 2;
        } else if index + 1 < bytes.len() && bytes[index] == b']' && bytes[index + 1] == b']' {
            bracket_depth = bracket_depth.saturating_sub(1);
            index += 2;
        } else if bytes[index] == b'|' && brace_depth == 0 && bracket_depth == 0 {
            chunks.push(&inner[chunk_start..index]);
            index += 1;
            chunk_start = index;
        } else {
            index += 1;
        }
    }
    chunks.push(&inner[chunk_start..]);
    chunks
}

fn parse_params(chunks: &[&str]) -> ParameterBlock {
    let mut block = ParameterBlock::new();
    let mut ordinal = 0usize;
    for chunk in chunks {
        match split_name_value(chunk) {
            Some((name, value)) => block.set(name.trim(), value),
            None => {
                // positional parameters get MediaWiki's implicit numbering
                ordinal += 1;
                block.set(&ordinal.to_string(), *chunk);
            }
        }
    }
    block
}

/// Split one parameter chunk at its first `=` outside nested markup.
fn split_name_value(chunk: &str) -> Option<(&str, &str)> {
    let bytes = chunk.as_bytes();
    let mut brace_depth = 0usize;
    let mut bracket_depth = 0usize;
    let mut index = 0usize;
    while index < bytes.len() {
        if index + 1 < bytes.len() && bytes[index] == b'{' && bytes[index + 1] == b'{' {
            brace_depth += 1;
            index += 2;
        } else if index + 1 < bytes.len() && bytes[index] == b'}' && bytes[index + 1] == b'}' {
            brace_depth = brace_depth.saturating_sub(1);
            index += 2;
        } else if index + 1 < bytes.len() && bytes[index] == b'[' && bytes[index + 1] == b'[' {
            bracket_depth += 1;
            index += 2;
        } else if index + 1 < bytes.len() && bytes[index] == b']' && bytes[index + 1] == b']' {
            bracket_depth = bracket_depth.saturating_sub(1);
            index += 2;
        } else if bytes[index] == b'=' && brace_depth == 0 && bracket_depth == 0 {
            return Some((&chunk[..index], &chunk[index + 1..]));
        } else {
            index += 1;
        }
    }
    None
}

fn detect_style(inner: &str, params_raw: &[&str]) -> InstanceStyle {
    let multiline = inner.contains("\n|");
    let first_named = params_raw.iter().find_map(|chunk| split_name_value(chunk));
    match first_named {
        Some((name_chunk, value_chunk)) => InstanceStyle {
            multiline,
            space_after_pipe: name_chunk.starts_with(' '),
            space_before_eq: name_chunk.ends_with(' '),
            space_after_eq: value_chunk.starts_with(' '),
        },
        None => InstanceStyle {
            multiline,
            ..InstanceStyle::default()
        },
    }
}

/// Template names compare with underscores as spaces and a case-insensitive
/// first letter, the way the wiki resolves them.
fn normalize_template_name(name: &str) -> String {
    let cleaned = name.trim().replace('_', " ");
    let mut chars = cleaned.chars();
    match chars.next() {
        Some(first) => {
            let mut out = String::with_capacity(cleaned.len());
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
            out
        }
        None => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHIP_PAGE: &str = "Intro text.\n{{Ship infobox\n| name = Vanguard\n| crew = 12 (Suggested: 8)\n| armor = 3\n}}\nBody text.\n";

    #[test]
    fn finds_multiline_instance_with_ordered_params() {
        let instance = find_template(SHIP_PAGE, "Ship infobox").expect("instance");
        assert_eq!(instance.name, "Ship infobox");
        assert_eq!(
            instance.block.names().collect::<Vec<_>>(),
            ["name", "crew", "armor"]
        );
        assert_eq!(instance.block.get("crew").expect("crew"), "12 (Suggested: 8)");
        assert!(instance.style.multiline);
        assert!(instance.style.space_after_pipe);
        assert!(instance.style.space_before_eq);
        assert!(instance.style.space_after_eq);
    }

    #[test]
    fn finds_inline_instance() {
        let text = "{{Ship infobox|crew=5|armor=2}}";
        let instance = find_template(text, "Ship infobox").expect("instance");
        assert!(!instance.style.multiline);
        assert_eq!(instance.block.get("crew").expect("crew"), "5");
        assert_eq!(instance.span(), (0, text.len()));
    }

    #[test]
    fn name_matching_normalizes_underscores_and_first_letter() {
        let text = "{{ship_infobox|crew=5}}";
        assert!(contains_template(text, "Ship infobox"));
        assert!(!contains_template(text, "Station infobox"));
    }

    #[test]
    fn skips_other_templates_before_the_match() {
        let text = "{{Stub}} some text {{Ship infobox|crew=5}}";
        let instance = find_template(text, "Ship infobox").expect("instance");
        assert_eq!(&text[instance.span().0..instance.span().1], "{{Ship infobox|crew=5}}");
    }

    #[test]
    fn nested_templates_and_piped_links_stay_inside_values() {
        let text = "{{Ship infobox|crew={{formatnum:1200}}|origin=[[Sol|home]]|armor=3}}";
        let instance = find_template(text, "Ship infobox").expect("instance");
        assert_eq!(instance.block.get("crew").expect("crew"), "{{formatnum:1200}}");
        assert_eq!(instance.block.get("origin").expect("origin"), "[[Sol|home]]");
        assert_eq!(instance.block.get("armor").expect("armor"), "3");
    }

    #[test]
    fn positional_params_get_implicit_numbering() {
        let text = "{{Ship infobox|Vanguard|crew=5|second}}";
        let instance = find_template(text, "Ship infobox").expect("instance");
        assert_eq!(instance.block.get("1").expect("1"), "Vanguard");
        assert_eq!(instance.block.get("2").expect("2"), "second");
        assert_eq!(
            instance.block.names().collect::<Vec<_>>(),
            ["1", "crew", "2"]
        );
    }

    #[test]
    fn unclosed_template_is_not_matched() {
        assert!(find_template("{{Ship infobox|crew=5", "Ship infobox").is_none());
    }

    #[test]
    fn replace_preserves_surrounding_text_and_layout() {
        let instance = find_template(SHIP_PAGE, "Ship infobox").expect("instance");
        let mut block = instance.block.clone();
        block.set("crew", "12");

        let updated = replace_template(SHIP_PAGE, &instance, &block);
        assert!(updated.starts_with("Intro text.\n{{Ship infobox\n"));
        assert!(updated.contains("| crew = 12\n"));
        assert!(updated.contains("| armor = 3\n"));
        assert!(updated.ends_with("}}\nBody text.\n"));
    }

    #[test]
    fn replace_inline_keeps_inline_layout() {
        let text = "before {{Ship infobox|crew=5|armor=2}} after";
        let instance = find_template(text, "Ship infobox").expect("instance");
        let mut block = instance.block.clone();
        block.set("crew", "6");
        assert_eq!(
            replace_template(text, &instance, &block),
            "before {{Ship infobox|crew=6|armor=2}} after"
        );
    }
}
