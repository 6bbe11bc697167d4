use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "scimq.pest"]
pub struct ScimqParser;
