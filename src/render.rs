use maud::{html, Markup, DOCTYPE};

use crate::{
    breadcrumb::Segment,
    listing::EntryRow,
    paths::MOUNT,
    sorting::{SortKey, SortOrder, SortSpec},
};

pub struct ListingPage<'a> {
    pub title: &'a str,
    pub rows: &'a [EntryRow],
    pub crumbs: &'a [Segment],
    pub sort: Option<SortSpec>,
}

fn head(title: &str) -> Markup {
    html! {
        head {
            meta charset="UTF-8";
            meta name="viewport" content="width=device-width, initial-scale=1.0";
            title { (title) }
            link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/font-awesome/4.7.0/css/font-awesome.min.css";
            link rel="stylesheet" href="/static/styles.css";
            script src="/static/app.js" defer {}
        }
    }
}

/// Header link for one column: the active column flips its order, others
/// start ascending.
fn sort_link(key: SortKey, current: Option<SortSpec>) -> (String, &'static str) {
    let (order, marker) = match current {
        Some(spec) if spec.key == key => (
            spec.order.toggled(),
            match spec.order {
                SortOrder::Ascending => "fa-sort-asc",
                SortOrder::Descending => "fa-sort-desc",
            },
        ),
        _ => (SortOrder::Ascending, "fa-sort"),
    };
    (format!("?s={}&o={}", key.as_str(), order.as_str()), marker)
}

fn column_title(key: SortKey) -> &'static str {
    match key {
        SortKey::Name => "Name",
        SortKey::Time => "Modified",
        SortKey::Type => "Type",
        SortKey::Size => "Size",
    }
}

pub fn listing_page(page: &ListingPage) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            (head(page.title))
            body {
                nav #breadcrumbs {
                    @for crumb in page.crumbs {
                        @if crumb.active {
                            span class="crumb active" { (crumb.label) }
                        } @else {
                            a class="crumb" href=(crumb.href) { (crumb.label) }
                            span class="sep" { "/" }
                        }
                    }
                }

                div #toolbar {
                    form action="/upload" method="post" enctype="multipart/form-data" {
                        input type="file" name="files" multiple;
                        button type="submit" { "Upload" }
                    }
                    form action="/new" method="post" {
                        input type="text" name="name" placeholder="New folder";
                        button type="submit" { "Create" }
                    }
                    form #move-form action="/move" method="post" {
                        input #move-from type="hidden" name="frompath";
                        input #move-to type="text" name="name" placeholder="Move / rename to";
                        button type="submit" { "Move" }
                    }
                    form #archive-form action="/archive" method="post" {
                        input #archive-list type="hidden" name="pathlist";
                        input #archive-name type="text" name="name" placeholder="bundle.zip";
                        button type="submit" { "Archive" }
                    }
                    button #download type="button" { "Download" }
                    button #delete type="button" { "Delete" }
                }

                table #file-list {
                    thead {
                        tr {
                            th { input class="select-all" type="checkbox"; }
                            @for key in SortKey::ALL {
                                @let (href, marker) = sort_link(key, page.sort);
                                th class={"table-header-" (key.as_str())} {
                                    a href=(href) { (column_title(key)) " " i class={"fa " (marker)} {} }
                                }
                            }
                        }
                    }
                    tbody {
                        @for row in page.rows {
                            tr class="file-row" data-path=(row.path) data-is-dir=(if row.is_dir { "true" } else { "false" }) {
                                td { input class="select" type="checkbox"; }
                                td class="name" {
                                    i class={"fa " (row.icon)} {}
                                    " "
                                    a href=(row.href) { (row.name) }
                                    @if !row.preview_url.is_empty() {
                                        " "
                                        a class="preview" href=(row.preview_url) target="_blank" { "preview" }
                                    }
                                }
                                td { (row.kind) }
                                td { (row.formatted_size) }
                                td { (row.modified_at) }
                            }
                        }
                    }
                }
                @if page.rows.is_empty() {
                    p class="empty" { "This folder is empty." }
                }
            }
        }
    }
}

pub fn error_page(title: &str, message: &str) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            (head(title))
            body {
                div class="error-box" {
                    h2 { (title) }
                    p { (message) }
                    a href={(MOUNT) "/"} { "Back" }
                }
            }
        }
    }
}

pub fn not_found_page() -> Markup {
    error_page("Not Found", "The page you asked for does not exist.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_column_toggles_order() {
        let current = Some(SortSpec {
            key: SortKey::Size,
            order: SortOrder::Descending,
        });
        assert_eq!(sort_link(SortKey::Size, current).0, "?s=size&o=asc");
        assert_eq!(sort_link(SortKey::Name, current).0, "?s=name&o=asc");
        assert_eq!(sort_link(SortKey::Time, None), ("?s=time&o=asc".to_string(), "fa-sort"));
    }

    #[test]
    fn listing_escapes_names() {
        let rows = vec![EntryRow {
            name: "<script>.txt".into(),
            is_dir: false,
            byte_size: 1,
            formatted_size: "1 B".into(),
            modified_at: "2024-01-01 00:00:00".into(),
            kind: "File".into(),
            icon: "fa-file-o".into(),
            href: "/home/%3Cscript%3E.txt".into(),
            path: "/home/%3Cscript%3E.txt".into(),
            preview_url: String::new(),
        }];
        let html = listing_page(&ListingPage {
            title: "/",
            rows: &rows,
            crumbs: &[],
            sort: None,
        })
        .into_string();
        assert!(html.contains("&lt;script&gt;.txt"));
        assert!(!html.contains("<script>.txt"));
        assert!(html.contains(r#"data-path="/home/%3Cscript%3E.txt""#));
    }
}
