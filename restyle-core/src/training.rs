//! Training targets for the ingredient-prediction model.

use crate::markers;
use crate::matcher::IngredientMatcher;
use crate::prompt;
use crate::store::RecipeStore;
use crate::types::Recipe;

/// One example per instruction: the recipe up to that step, then the mentions
/// the step makes.
pub fn next_ingredient_examples(recipe: &Recipe, matcher: &IngredientMatcher) -> Vec<String> {
    let mentions = matcher.match_mentions(&recipe.steps, &recipe.ingredients, Some(&recipe.title));
    mentions
        .iter()
        .enumerate()
        .map(|(i, step_mentions)| {
            format!(
                "{} {} {}",
                prompt::next_ingredients_prompt(recipe, i),
                prompt::format_mentions(step_mentions),
                markers::END_TEXT
            )
        })
        .collect()
}

/// Mentions for each instruction of a stored recipe.
///
/// An unknown id gives an empty list so a batch can carry on without it.
pub fn mentions_for_record(
    store: &dyn RecipeStore,
    id: &str,
    matcher: &IngredientMatcher,
) -> Vec<Vec<String>> {
    match store.get(id) {
        Ok(recipe) => {
            matcher.match_mentions(&recipe.steps, &recipe.ingredients, Some(&recipe.title))
        }
        Err(e) => {
            tracing::warn!(recipe_id = id, error = %e, "Falling back to empty mentions");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonRecipeStore;
    use std::collections::BTreeMap;

    fn tacos() -> Recipe {
        Recipe::new(
            "Bean Tacos",
            ["1 can beans", "8 tortillas", "1 avocado"],
            ["Warm the tortillas.", "Mash the avocado."],
        )
    }

    #[test]
    fn test_examples_per_step() {
        let examples = next_ingredient_examples(&tacos(), &IngredientMatcher::default());
        assert_eq!(examples.len(), 2);
        assert_eq!(
            examples[0],
            "<|startoftext|> Bean Tacos <endoftitle> 1 can beans <ing> 8 tortillas <ing> 1 avocado <endofings> <endofinst> tortillas <|endoftext|>"
        );
        assert!(examples[1].contains("Warm the tortillas. <endofinst> avocado <|endoftext|>"));
    }

    #[test]
    fn test_unknown_record_is_empty() {
        let mut recipes = BTreeMap::new();
        recipes.insert("r1".to_string(), tacos());
        let store = JsonRecipeStore::new(recipes, Vec::new());
        let matcher = IngredientMatcher::default();

        assert_eq!(mentions_for_record(&store, "r1", &matcher).len(), 2);
        assert!(mentions_for_record(&store, "missing", &matcher).is_empty());
    }
}
