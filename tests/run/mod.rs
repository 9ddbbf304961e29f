mod bdd_steps;
mod lifecycle;
mod test_helpers;
