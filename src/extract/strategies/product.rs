use super::{evidence, first_of, put_list, put_text};
use crate::classifier::PageType;
use crate::extract::{dom, ContentExtractor, Fields};
use scraper::Html;
use serde_json::{json, Value};
use url::Url;

/// Extractor for product detail pages
pub struct ProductExtractor;

impl ContentExtractor for ProductExtractor {
    fn name(&self) -> &str {
        "product"
    }

    fn page_types(&self) -> Vec<PageType> {
        vec![PageType::Product]
    }

    fn extract(&self, document: &Html, url: &Url) -> Fields {
        let mut fields = Fields::new();

        put_text(
            &mut fields,
            "name",
            first_of(
                document,
                &[
                    "[itemtype*='schema.org/Product'] [itemprop=name]",
                    ".product-title",
                    ".product-name",
                    "h1",
                ],
            )
            .or_else(|| dom::meta_content(document, "og:title")),
        );

        let price_text = dom::first_attr(document, "[itemprop=price]", "content")
            .or_else(|| dom::meta_content(document, "product:price:amount"))
            .or_else(|| first_of(document, &["[itemprop=price]", ".price"]));

        if let Some(text) = &price_text {
            if let Some(price) = parse_price(text) {
                fields.insert("price".to_string(), json!(price));
            }
        }

        put_text(
            &mut fields,
            "currency",
            dom::first_attr(document, "[itemprop=priceCurrency]", "content")
                .or_else(|| dom::meta_content(document, "product:price:currency"))
                .or_else(|| price_text.as_deref().and_then(currency_from_symbol)),
        );
        put_text(
            &mut fields,
            "availability",
            dom::first_attr(document, "[itemprop=availability]", "href")
                .or_else(|| dom::first_attr(document, "[itemprop=availability]", "content"))
                .map(|value| value.rsplit('/').next().unwrap_or_default().to_string())
                .or_else(|| first_of(document, &[".availability", ".stock"])),
        );
        put_text(
            &mut fields,
            "sku",
            dom::first_attr(document, "[itemprop=sku]", "content")
                .or_else(|| first_of(document, &["[itemprop=sku]", ".sku"])),
        );
        put_text(
            &mut fields,
            "brand",
            first_of(document, &["[itemprop=brand] [itemprop=name]", "[itemprop=brand]", ".brand"]),
        );
        put_text(
            &mut fields,
            "description",
            first_of(document, &["[itemprop=description]", ".product-description"])
                .or_else(|| dom::meta_content(document, "description")),
        );

        if let Some(rating) = dom::first_attr(document, "[itemprop=ratingValue]", "content")
            .or_else(|| dom::first_text(document, "[itemprop=ratingValue]"))
            .and_then(|value| value.parse::<f64>().ok())
        {
            fields.insert("rating".to_string(), json!(rating));
        }

        let images: Vec<String> = dom::selector("[itemprop=image], .product-image img, .gallery img")
            .map(|selector| {
                document
                    .select(&selector)
                    .filter_map(|img| {
                        img.value()
                            .attr("src")
                            .or_else(|| img.value().attr("content"))
                    })
                    .filter_map(|src| dom::resolve_link(src, url))
                    .collect()
            })
            .unwrap_or_default();
        put_list(&mut fields, "images", images);

        if fields.is_empty() {
            return fields;
        }
        fields.insert(
            "in_stock".to_string(),
            Value::Bool(dom::count(document, ".out-of-stock, .sold-out") == 0),
        );
        fields
    }

    /// Product schema, price, purchase button and product title markup
    fn confidence_score(&self, document: &Html) -> f64 {
        evidence(
            document,
            &[
                "[itemtype*='schema.org/Product']",
                "[itemprop=price], .price",
                ".add-to-cart, #add-to-cart, button[name=add-to-cart], form[action*=cart]",
                ".product-title, .product-name, [itemprop=name]",
            ],
        )
    }
}

/// Parses the first number in a price string
///
/// Handles both `1,299.00` and `1.299,00`; the last separator followed by
/// one or two digits is taken as the decimal point.
pub(crate) fn parse_price(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let number: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let number = number.trim_end_matches(['.', ',']);

    let decimal_at = number.rfind(['.', ',']).filter(|&index| {
        let digits = number.len() - index - 1;
        digits == 1 || digits == 2
    });

    let normalized: String = match decimal_at {
        Some(index) => {
            let integer: String = number[..index].chars().filter(|c| c.is_ascii_digit()).collect();
            format!("{}.{}", integer, &number[index + 1..])
        }
        None => number.chars().filter(|c| c.is_ascii_digit()).collect(),
    };

    normalized.parse().ok()
}

fn currency_from_symbol(text: &str) -> Option<String> {
    let code = if text.contains('€') {
        "EUR"
    } else if text.contains('£') {
        "GBP"
    } else if text.contains('¥') {
        "JPY"
    } else if text.contains('$') {
        "USD"
    } else {
        return None;
    };
    Some(code.to_string())
}
