use taskorder::output::{format_human, HumanOutput};

#[test]
fn human_output_renders_sections_in_order() {
    let mut human = HumanOutput::new("taskorder check: job");
    human.push_summary("siblings", "12");
    human.push_summary("rebalance", "needed (min gap 1)");
    human.push_warning("background rebalance did not complete");
    human.push_next_step("taskorder rebalance --list job");

    let rendered = format_human(&human);
    let expected = "\
taskorder check: job

Summary:
- siblings: 12
- rebalance: needed (min gap 1)

Warnings:
- background rebalance did not complete

Next steps:
- taskorder rebalance --list job";
    assert_eq!(rendered, expected);
}

#[test]
fn empty_sections_are_omitted() {
    let human = HumanOutput::new("taskorder init: nothing to do");
    assert_eq!(format_human(&human), "taskorder init: nothing to do");
}
