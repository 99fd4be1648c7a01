//! Integration test reproducing the "merge of three subjects" scenario end
//! to end through the crate's public API.

use confluence::{AsyncIterator, CurrentValueSubject, Merge, PassthroughSubject};

#[tokio::test]
async fn merge_of_three_subjects() {
    let a = CurrentValueSubject::<i32>::new(1);
    let b = PassthroughSubject::<i32>::new();
    let c = PassthroughSubject::<i32>::new();

    let bases: Vec<Box<dyn AsyncIterator<i32, std::convert::Infallible>>> =
        vec![Box::new(a.make_iterator()), Box::new(b.make_iterator()), Box::new(c.make_iterator())];
    let mut merged = Merge::new(bases);

    assert_eq!(merged.next().await, Ok(Some(1)));
    b.send(2);
    assert_eq!(merged.next().await, Ok(Some(2)));
    c.send(3);
    assert_eq!(merged.next().await, Ok(Some(3)));
    c.send(4);
    assert_eq!(merged.next().await, Ok(Some(4)));
    b.send(5);
    assert_eq!(merged.next().await, Ok(Some(5)));
    a.send(6);
    assert_eq!(merged.next().await, Ok(Some(6)));

    a.send_terminal(confluence::Termination::Finished);
    b.send_terminal(confluence::Termination::Finished);
    c.send_terminal(confluence::Termination::Finished);
    assert_eq!(merged.next().await, Ok(None));
}
