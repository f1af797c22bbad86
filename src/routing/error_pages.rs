//! Error pages of a route.
//!
//! A redirect is handled inline by the location's `error_page`; a return
//! body needs a named location holding its content type and headers.

use crate::domain::ErrorPage as ErrorPageSpec;
use crate::model::http::{ErrorPage, ErrorPageLocation, Header, Return};

pub fn error_page_name(error_page_index: usize, index: usize) -> String {
    format!("@error_page_{}_{}", error_page_index, index)
}

fn codes(codes: &[i64]) -> String {
    codes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(" ")
}

/// `error_page` entries for the locations of a route
pub fn generate_error_pages(error_page_index: usize, pages: &[ErrorPageSpec]) -> Vec<ErrorPage> {
    pages
        .iter()
        .enumerate()
        .filter_map(|(i, page)| {
            let (name, response_code) = match (&page.redirect, &page.return_) {
                (Some(redirect), _) => {
                    (redirect.url.clone(), if redirect.code == 0 { 301 } else { redirect.code })
                }
                (None, Some(ret)) => (error_page_name(error_page_index, i), ret.action_return.code),
                (None, None) => return None,
            };
            Some(ErrorPage { name, codes: codes(&page.codes), response_code })
        })
        .collect()
}

/// Named locations for the return-body error pages of a route
pub fn generate_error_page_locations(error_page_index: usize, pages: &[ErrorPageSpec]) -> Vec<ErrorPageLocation> {
    pages
        .iter()
        .enumerate()
        .filter(|(_, page)| page.redirect.is_none())
        .filter_map(|(i, page)| {
            let ret = page.return_.as_ref()?;
            let default_type = if ret.action_return.content_type.is_empty() {
                "text/html".to_string()
            } else {
                ret.action_return.content_type.clone()
            };
            Some(ErrorPageLocation {
                name: error_page_name(error_page_index, i),
                default_type,
                return_: Some(Return::new(0, ret.action_return.body.clone())),
                headers: ret.headers.iter().map(|h| Header::new(&h.name, &h.value)).collect(),
            })
        })
        .collect()
}
