use crate::filter::{resolve_column, ColumnSpec, FilterEncoder};
use crate::params::ServerParams;

/// Composes request URLs of the form
/// `<base><path>?page=..&limit=..[&sort=..][&filter=..]*<extra>`.
pub struct RequestBuilder<'a> {
    pub base_url: &'a str,
    pub path: &'a str,
    pub default_sort: Option<&'a str>,
    pub columns: &'a [ColumnSpec],
    pub encoder: &'a FilterEncoder,
}

impl RequestBuilder<'_> {
    pub fn build(&self, params: &ServerParams, extra_params: Option<&str>) -> String {
        let mut url = join_base(self.base_url, self.path);
        url.push_str(&format!("?page={}&limit={}", params.page, params.per_page));

        if let Some(sort) = params.sort.first() {
            url.push_str(&format!("&sort={sort}"));
        } else if let Some(default_sort) = self.default_sort.filter(|s| !s.is_empty()) {
            url.push_str("&sort=");
            url.push_str(default_sort);
        }

        for (name, value) in &params.column_filters {
            let column = resolve_column(self.columns, name);
            let expression = self.encoder.encode(name, column, value);
            url.push('&');
            url.push_str(&expression.query_pair());
        }

        if let Some(extra) = extra_params {
            url.push_str(extra);
        }
        url
    }
}

pub(crate) fn join_base(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) if !path.is_empty() => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}
