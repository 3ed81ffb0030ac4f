use std::fmt::Write;

use crate::types::{MergeRecipeRequest, ParsedRecipe, RecipeCandidate, PREFERRED_RECIPE_SITES};

pub fn ranking_prompt(
    dish_name: &str,
    request: &MergeRecipeRequest,
    candidates: &[RecipeCandidate],
    max: usize,
) -> String {
    let mut p = String::new();
    p.push_str("You are a professional recipe editor.\n");
    p.push_str("Given a dish request and a list of search results, choose the best base recipes to merge.\n\n");
    let _ = writeln!(p, "Dish name: {}", dish_name);
    let _ = writeln!(
        p,
        "Authenticity mode: {} (classic | simplified | healthy)",
        request.authenticity.as_str()
    );
    if request.allergens.is_empty() {
        p.push_str("Allergens to be cautious about: none specified\n\n");
    } else {
        let _ = writeln!(p, "Allergens to be cautious about: {}\n", request.allergens.join(", "));
    }

    p.push_str("Each candidate has a URL, domain, title and snippet. Rules:\n");
    p.push_str("- Prefer recipes that are really this dish, not casseroles, dips, muffins or other spin-offs.\n");
    p.push_str("- Prefer full main-dish recipes over side or snack variants.\n");
    p.push_str("- Prefer clear, well-tested sources such as test kitchens and established recipe blogs.\n");
    let _ = writeln!(
        p,
        "- Favor these sites when it makes sense: {}",
        PREFERRED_RECIPE_SITES.join(", ")
    );
    p.push_str("- At most one obvious twist recipe may be included if it helps with variation ideas.\n");
    p.push_str("- With allergens listed, lean toward recipes that are easy to adapt, but do not exclude the rest.\n");
    p.push_str("- Spread picks across different websites where reasonable.\n\n");

    p.push_str("CANDIDATES:\n");
    for (i, c) in candidates.iter().enumerate() {
        let _ = writeln!(p, "{}.", i + 1);
        let _ = writeln!(p, "  URL: {}", c.url);
        let _ = writeln!(p, "  Domain: {}", c.domain);
        let _ = writeln!(p, "  Title: {}", c.title);
        let _ = writeln!(p, "  Snippet: {}\n", c.snippet);
    }

    let _ = write!(
        p,
        r#"Return ONLY JSON with this structure:

{{
  "selectedUrls": [
    "https://example.com/recipe1",
    "https://example.com/recipe2"
  ]
}}

- Include at most {} URLs, ordered from best to worst.
- Every URL must come from the candidate list above.
"#,
        max
    );
    p
}

pub fn parse_prompt(content: &str) -> String {
    format!(
        r#"Extract the recipe from this page content and return structured JSON.

Page content:
{}

Return JSON with exactly this structure:
{{
  "title": "recipe title",
  "ingredients": ["2 lbs chicken thighs, cut into pieces", "1 cup Thai basil leaves"],
  "steps": ["Heat oil in a wok over high heat", "Add chicken and cook until golden"],
  "totalTimeMinutes": 45,
  "prepTimeMinutes": 15,
  "cookTimeMinutes": 20,
  "waitTimeMinutes": 10,
  "servings": 4
}}

Timing rules:
- prepTimeMinutes: knife work, measuring, mixing and assembly before cooking.
- cookTimeMinutes: time actively cooking over heat.
- waitTimeMinutes: hands-off time such as marinating, rising, resting or chilling.
- totalTimeMinutes should roughly equal prep + cook + wait.
Estimate timings from the steps when the page does not state them.

Return ONLY valid JSON, with no markdown and no commentary. Ignore navigation, comments and unrelated page content."#,
        content
    )
}

pub fn merge_prompt(recipes: &[ParsedRecipe], request: &MergeRecipeRequest) -> String {
    let mut p = String::new();
    p.push_str("You are a professional chef and recipe developer. Merge the source recipes below into ONE authoritative recipe.\n\n");
    let _ = writeln!(p, "Dish request: {}", request.dish_name);
    let _ = writeln!(p, "Authenticity mode: {}", request.authenticity.as_str());
    let allergens = if request.allergens.is_empty() {
        "None".to_string()
    } else {
        request.allergens.join(", ")
    };
    let _ = writeln!(p, "Declared allergens to avoid (if possible): {}", allergens);
    if request.servings > 0 {
        let _ = writeln!(p, "Target servings: {}", request.servings);
    }
    if let Some(minutes) = request.max_time_minutes {
        let _ = writeln!(p, "Preferred total time (soft constraint): {} minutes", minutes);
    }

    p.push_str("\nSource recipes:\n");
    for recipe in recipes {
        p.push_str("---\n");
        let _ = writeln!(p, "Recipe from {}:", recipe.source_url);
        let _ = writeln!(p, "Title: {}", recipe.title);
        let _ = writeln!(
            p,
            "Servings: {} | Time: {} min\n",
            recipe.servings, recipe.total_time_minutes
        );
        p.push_str("Ingredients:\n");
        for ingredient in &recipe.ingredients {
            let _ = writeln!(p, "- {}", ingredient);
        }
        p.push_str("\nSteps:\n");
        for (i, step) in recipe.steps.iter().enumerate() {
            let _ = writeln!(p, "{}. {}", i + 1, step);
        }
        p.push_str("---\n\n");
    }

    p.push_str(MERGE_INSTRUCTIONS);
    p
}

const MERGE_INSTRUCTIONS: &str = r#"AUTHENTICITY MODES:
- "classic": traditional ingredients and techniques, authentic flavor profile.
- "simplified": keep the core flavor with fewer, easier-to-find ingredients and simpler weeknight steps.
- "healthy": lighten the dish (less sugar and oil, more vegetables or whole grains) while keeping its character.

ALLERGENS:
- With an empty list, do not remove ingredients; offer substitutions for common allergens instead.
- With a non-empty list, avoid those allergens when a reasonable substitution exists.
- If an allergen-bearing ingredient is structurally essential, keep it and offer a substitution noting the texture or flavor change.

MERGING RULES:
1. Produce ONE cohesive recipe, not a list of alternatives.
2. Where sources agree, keep that approach. Where they differ, choose based on tradition (classic), flavor balance, texture and practicality for home cooks.
3. Target the requested serving count when one is given; treat a maximum time as a soft constraint.
4. Keep steps clear and concise and give step timings where sensible.
5. Ingredients are "quantity | unit | ingredient | preparation":
   - "unit" is only a measurement unit (tbsp, tsp, cup, cups, oz, lb, g, ml, whole), never numbers or the ingredient name.
   - Ranges go entirely in "quantity", e.g. "quantity": "1 to 1 1/4", "unit": "cups".
   - For "to taste", "pinch" or "for garnish", put the phrase in "quantity" and leave "unit" empty.
   - Multi-use ingredients (e.g. lemon zest and juice) may share one line with a detailed "preparation".
6. Do not list reserved pasta water as an ingredient; mention it only in steps.

TIMING RULES:
- prepTimeMinutes: active prep. cookTimeMinutes: active cooking over heat.
- waitTimeMinutes: hands-off time; sum multiple resting or marinating periods.
- totalTimeMinutes roughly equals prep + cook + wait.

SUBSTITUTIONS AND VARIATIONS:
- allergenSubstitutions: only swaps whose purpose is avoiding an allergen; each has a non-empty "allergensAddressed".
- variationSuggestions: optional tweaks for flavor, texture, nutrition or presentation.

Return ONLY valid JSON matching this schema:
{
  "mergedRecipe": {
    "title": "string",
    "description": "1-2 sentences about the dish",
    "servings": 4,
    "totalTimeMinutes": 45,
    "prepTimeMinutes": 15,
    "cookTimeMinutes": 20,
    "waitTimeMinutes": 10,
    "ingredients": [
      {"quantity": "1.5", "unit": "lbs", "ingredient": "chicken thighs", "preparation": "cut into 1-inch pieces", "substitutionNote": null}
    ],
    "steps": [
      {"stepNumber": 1, "instruction": "string", "timeMinutes": 5, "technique": "saute", "tips": "string"}
    ],
    "cuisine": "string",
    "difficultyLevel": "easy|medium|hard"
  },
  "allergenSubstitutions": [
    {"original": "butter", "replacement": "olive oil", "allergensAddressed": ["dairy"], "notes": "slightly changes flavor"}
  ],
  "variationSuggestions": [
    {"name": "Extra-Veggie Version", "description": "More vegetables for color and nutrition.", "changeType": "nutrition", "changes": ["Add 1 cup julienned carrots with the onions."]}
  ]
}"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthenticityMode;

    #[test]
    fn ranking_prompt_lists_candidates_and_limit() {
        let mut request = MergeRecipeRequest::new("pad thai");
        request.authenticity = AuthenticityMode::Classic;
        request.allergens = vec!["peanuts".into()];
        let candidates = vec![RecipeCandidate {
            url: "https://a.com/pad-thai".into(),
            title: "Best Pad Thai".into(),
            snippet: "Tamarind".into(),
            domain: "a.com".into(),
        }];

        let prompt = ranking_prompt("pad thai", &request, &candidates, 8);
        assert!(prompt.contains("Authenticity mode: classic"));
        assert!(prompt.contains("cautious about: peanuts"));
        assert!(prompt.contains("URL: https://a.com/pad-thai"));
        assert!(prompt.contains("at most 8 URLs"));
    }

    #[test]
    fn merge_prompt_includes_optional_constraints() {
        let mut request = MergeRecipeRequest::new("ramen");
        request.servings = 2;
        request.max_time_minutes = Some(30);
        let recipes = vec![ParsedRecipe {
            title: "Shoyu Ramen".into(),
            source_url: "https://b.com/ramen".into(),
            steps: vec!["Boil".into(), "Serve".into()],
            ..Default::default()
        }];

        let prompt = merge_prompt(&recipes, &request);
        assert!(prompt.contains("Target servings: 2"));
        assert!(prompt.contains("soft constraint): 30 minutes"));
        assert!(prompt.contains("Recipe from https://b.com/ramen:"));
        assert!(prompt.contains("2. Serve"));
        assert!(prompt.contains("Declared allergens to avoid (if possible): None"));
    }
}
