//! `bake list` command

use anyhow::Result;

use bake::core::load_all_recipes;
use bake::GlobalContext;

pub fn execute(ctx: &GlobalContext) -> Result<()> {
    let recipes = load_all_recipes(&ctx.recipe_path())?;

    if recipes.is_empty() {
        eprintln!("no recipes in {}", ctx.recipe_path().display());
        return Ok(());
    }

    let width = recipes.keys().map(|name| name.len()).max().unwrap_or(0);
    for (name, recipe) in &recipes {
        if recipe.desc.is_empty() {
            println!("{}", name);
        } else {
            println!("{:width$}  {}", name, recipe.desc, width = width);
        }
    }

    Ok(())
}
