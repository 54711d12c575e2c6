use crate::categories::AllowedCategories;

pub fn build_classification_prompt(
    item_name: &str,
    vendor_name: &str,
    allowed: &AllowedCategories,
) -> String {
    format!(
        "Classify the following product: '{}' from '{}' into one of these categories: {}. Only respond with the category.",
        item_name,
        vendor_name,
        allowed.to_list_literal()
    )
}
